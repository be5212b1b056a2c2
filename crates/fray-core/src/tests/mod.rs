//! Cross-module tests.
//!
//! - `helpers.rs`: fixtures for characters, NPCs and a wired controller
//! - `integration.rs`: whole fights driven through the controller
//! - `determinism.rs`: same seed, same fight
//! - `properties.rs`: proptest checks of the rules

mod determinism;
mod helpers;
mod properties;

pub use helpers::*;
