//! # Fray Core
//!
//! Turn-based combat for a persistent multiplayer world.
//!
//! Fights are resolved between one or more player characters and one or
//! more NPCs. This crate owns everything that happens between "combat
//! begins" and "combat ended": initiative and turn order, the
//! attack/defend/flee ruleset, NPC behavior, turn timeouts, and writing the
//! results back to the world.
//!
//! ## Architecture
//!
//! - **Instance** ([`instance`]): the record of one fight. Combatants live in
//!   a single arena; rosters and turn order index into it.
//! - **Manager** ([`manager`]): shared registry of live fights with
//!   character and NPC indexes. Fights are driven through exclusive
//!   sessions.
//! - **Engine** ([`engine`]): the rules, applied to an instance with
//!   explicit time and injectable dice.
//! - **Controller** ([`controller`]): player commands, NPC turns,
//!   notifications, the periodic tick, and cleanup.
//!
//! Storage and messaging stay outside the crate behind the traits in
//! [`directory`]; [`memory`] has in-memory versions for tests.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use fray_core::config::CombatConfig;
//! use fray_core::controller::Controller;
//! use fray_core::directory::{Character, EnemyTrait, Npc};
//! use fray_core::engine::Engine;
//! use fray_core::instance::RoomId;
//! use fray_core::manager::Manager;
//! use fray_core::memory::{InMemoryCharacters, InMemoryNpcs, RecordingSink};
//! use fray_dice::SeededDice;
//!
//! let characters = Arc::new(InMemoryCharacters::new());
//! characters.insert(Character::new("c1", "u1", "Ayla"));
//! let npcs = Arc::new(InMemoryNpcs::new());
//! npcs.insert(Npc::new("n1", "Rat").with_enemy(EnemyTrait {
//!     attack_power: 1,
//!     defense: 0,
//!     flee_threshold: 0.0,
//! }));
//!
//! let controller = Controller::new(
//!     Manager::new(),
//!     Engine::new(CombatConfig::default(), SeededDice::new(7)),
//!     characters,
//!     npcs,
//!     Arc::new(RecordingSink::new()),
//! );
//!
//! let now = Utc::now();
//! let fight = controller
//!     .engage(RoomId::new("cellar"), &["c1".into()], &["n1".into()], now)
//!     .unwrap();
//! assert!(controller.manager().get_instance(fight).is_some());
//! assert!(controller.is_player_in_combat(&"c1".into()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use fray_dice;

pub mod combatant;
pub mod config;
pub mod controller;
pub mod directory;
pub mod engine;
pub mod error;
pub mod instance;
pub mod manager;
pub mod memory;
pub mod status;

pub use combatant::{CombatAction, Combatant, CombatantId, CombatantKind, CombatantStatus, UserId};
pub use config::CombatConfig;
pub use controller::{ActionReport, ActionStatus, Controller};
pub use engine::Engine;
pub use error::{ConfigError, DeliveryError, DirectoryError, EngageError};
pub use instance::{CombatInstance, CombatState, InstanceId, RoomId};
pub use manager::{CombatSession, Manager};
pub use status::CombatSummary;

#[cfg(test)]
mod tests;
