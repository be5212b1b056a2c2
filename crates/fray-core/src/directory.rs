//! Contracts with the world outside the fight.
//!
//! Characters and NPCs are stored elsewhere. A fight reads them once when it
//! starts, then writes results back when it ends or when a player leaves
//! early. Messages to players go through a [`NotificationSink`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::combatant::{CombatantId, UserId};
use crate::error::{DeliveryError, DirectoryError};
use crate::instance::{CombatState, InstanceId};

/// Converts an ability score into its modifier: `floor((score - 10) / 2)`.
///
/// ```
/// use fray_core::directory::ability_modifier;
///
/// assert_eq!(ability_modifier(16), 3);
/// assert_eq!(ability_modifier(10), 0);
/// assert_eq!(ability_modifier(9), -1);
/// ```
#[must_use]
pub const fn ability_modifier(score: i32) -> i32 {
    score.saturating_sub(10).div_euclid(2)
}

// =============================================================================
// Entity records
// =============================================================================

/// A persisted player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Character id.
    pub id: CombatantId,
    /// Account that plays the character.
    pub owner: UserId,
    /// Display name.
    pub name: String,
    /// Current hit points.
    pub current_hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Strength score.
    pub strength: i32,
    /// Dexterity score.
    pub dexterity: i32,
    /// Constitution score.
    pub constitution: i32,
    /// Damage of the equipped weapon.
    pub weapon_damage: i32,
    /// Defense of the worn armor.
    pub armor_defense: i32,
    /// True while the character is fighting.
    pub in_combat: bool,
    /// Fight the character is in.
    pub combat_instance_id: Option<InstanceId>,
}

impl Character {
    /// A level-one character with all scores at 10.
    #[must_use]
    pub fn new(id: impl Into<CombatantId>, owner: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
            current_hp: 10,
            max_hp: 10,
            strength: 10,
            dexterity: 10,
            constitution: 10,
            weapon_damage: 0,
            armor_defense: 0,
            in_combat: false,
            combat_instance_id: None,
        }
    }
}

/// Combat stats of an NPC that can be fought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTrait {
    /// Base damage of a landed hit.
    pub attack_power: i32,
    /// Armor value.
    pub defense: i32,
    /// HP fraction at or below which the NPC tries to flee. Zero never flees.
    pub flee_threshold: f64,
}

/// Lifecycle of an NPC in the world.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcState {
    /// Going about its business.
    #[default]
    Idle,
    /// Fighting.
    Combat,
    /// Killed; waiting to respawn.
    Dead,
}

impl fmt::Display for NpcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Combat => write!(f, "combat"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// A persisted NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    /// NPC instance id.
    pub id: CombatantId,
    /// Display name.
    pub name: String,
    /// Level; a quarter of it feeds every modifier.
    pub level: i32,
    /// Current hit points.
    pub current_hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Present only on NPCs that can be fought.
    pub enemy: Option<EnemyTrait>,
    /// True while the NPC is fighting.
    pub in_combat: bool,
    /// Fight the NPC is in.
    pub combat_instance_id: Option<InstanceId>,
    /// World lifecycle state.
    pub state: NpcState,
}

impl Npc {
    /// An idle, non-hostile level-one NPC.
    #[must_use]
    pub fn new(id: impl Into<CombatantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: 1,
            current_hp: 10,
            max_hp: 10,
            enemy: None,
            in_combat: false,
            combat_instance_id: None,
            state: NpcState::Idle,
        }
    }

    /// Makes the NPC fightable.
    #[must_use]
    pub fn with_enemy(mut self, enemy: EnemyTrait) -> Self {
        self.enemy = Some(enemy);
        self
    }

    /// True when the NPC can be fought.
    #[must_use]
    pub fn is_enemy(&self) -> bool {
        self.enemy.is_some()
    }
}

// =============================================================================
// Messages
// =============================================================================

/// What a combat message is about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// The fight started.
    Started,
    /// Someone acted.
    Action,
    /// The recipient must act now.
    YourTurn,
    /// The fight ended.
    Ended,
}

/// A message pushed to a player during a fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatMessage {
    /// Fight the message belongs to.
    pub instance_id: InstanceId,
    /// Message category.
    pub kind: MessageKind,
    /// Terminal state, set on `Ended` messages.
    pub state: Option<CombatState>,
    /// Text shown to the player.
    pub text: String,
}

impl CombatMessage {
    /// Builds a message.
    #[must_use]
    pub fn new(instance_id: InstanceId, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            instance_id,
            kind,
            state: None,
            text: text.into(),
        }
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Character storage.
pub trait CharacterDirectory: Send + Sync {
    /// Loads a character.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::NotFound`] for unknown ids, or a backend failure.
    fn find_by_id(&self, id: &CombatantId) -> Result<Character, DirectoryError>;

    /// Stores a character.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::NotFound`] for unknown ids, or a backend failure.
    fn update(&self, character: &Character) -> Result<(), DirectoryError>;
}

/// NPC storage.
pub trait NpcDirectory: Send + Sync {
    /// Loads an NPC.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::NotFound`] for unknown ids, or a backend failure.
    fn find_by_id(&self, id: &CombatantId) -> Result<Npc, DirectoryError>;

    /// Mutates a live NPC in place. Returns false if the NPC is gone.
    fn update_instance(&self, id: &CombatantId, f: &mut dyn FnMut(&mut Npc)) -> bool;
}

/// Outbound messages to users.
pub trait NotificationSink: Send + Sync {
    /// Delivers a message to one user.
    ///
    /// # Errors
    ///
    /// [`DeliveryError`] when the user cannot be reached.
    fn send_to_user(&self, user: &UserId, message: &CombatMessage) -> Result<(), DeliveryError>;
}
