//! Error types.
//!
//! Rule outcomes (a miss, an invalid target, acting while down) are plain
//! values, not errors. The enums here cover collaborator failures, engaging a
//! fight, and loading configuration.

use thiserror::Error;

use crate::combatant::CombatantId;

/// Failure reported by a character or NPC directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// No entity with the id exists.
    #[error("entity not found: {0}")]
    NotFound(CombatantId),

    /// The backing store refused the operation.
    #[error("directory backend failure: {0}")]
    Backend(String),
}

/// Failure delivering a message to a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The user has no live connection.
    #[error("user {0} is not connected")]
    NotConnected(String),

    /// The transport failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Reasons a fight could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngageError {
    /// No player characters were named.
    #[error("a fight needs at least one player")]
    NoPlayers,

    /// No NPCs were named.
    #[error("a fight needs at least one enemy")]
    NoEnemies,

    /// A character is already fighting elsewhere.
    #[error("character {0} is already in combat")]
    PlayerBusy(CombatantId),

    /// An NPC is already fighting elsewhere.
    #[error("npc {0} is already in combat")]
    NpcBusy(CombatantId),

    /// The NPC cannot be fought.
    #[error("npc {0} is not an enemy")]
    NotAnEnemy(CombatantId),

    /// The NPC is already dead.
    #[error("npc {0} is already dead")]
    AlreadyDead(CombatantId),

    /// The same id was named twice.
    #[error("{0} is named more than once")]
    Duplicate(CombatantId),

    /// Looking up a participant failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Invalid combat configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_error_converts_into_engage_error() {
        let err: EngageError = DirectoryError::NotFound("c1".into()).into();
        assert_eq!(err.to_string(), "entity not found: c1");
    }

    #[test]
    fn invalid_config_names_field() {
        let err = ConfigError::Invalid {
            field: "flee_min_chance",
            reason: "must be within 0..=1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for flee_min_chance: must be within 0..=1"
        );
    }
}
