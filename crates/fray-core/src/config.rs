//! Tunable combat rules.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```
//! use fray_core::config::CombatConfig;
//!
//! let config = CombatConfig::from_json(r#"{ "turn_timeout_secs": 30 }"#).unwrap();
//! assert_eq!(config.turn_timeout_secs, 30);
//! assert_eq!(config.combat_timeout_minutes, 30);
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Rules knobs shared by the engine and the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Seconds a player has to act before the turn times out.
    pub turn_timeout_secs: u64,
    /// Consecutive timed-out turns before the player is forced to flee.
    pub afk_auto_flee_after_turns: u32,
    /// Flee chance before DEX.
    pub flee_base_chance: f64,
    /// Flee chance added per point of DEX modifier.
    pub flee_dex_bonus: f64,
    /// Lowest possible flee chance.
    pub flee_min_chance: f64,
    /// Highest possible flee chance.
    pub flee_max_chance: f64,
    /// Share of defense granted as a bonus when defending.
    pub defend_bonus_percent: f64,
    /// Smallest defend bonus.
    pub min_defend_bonus: i32,
    /// Damage multiplier on a natural 20.
    pub critical_multiplier: i32,
    /// Fight duration ceiling in minutes.
    pub combat_timeout_minutes: i64,
    /// NPC turns driven per player action before giving up.
    pub max_npc_turns: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: 60,
            afk_auto_flee_after_turns: 3,
            flee_base_chance: 0.50,
            flee_dex_bonus: 0.02,
            flee_min_chance: 0.10,
            flee_max_chance: 0.95,
            defend_bonus_percent: 0.50,
            min_defend_bonus: 2,
            critical_multiplier: 2,
            combat_timeout_minutes: 30,
            max_npc_turns: 10,
        }
    }
}

impl CombatConfig {
    /// Parses a config from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("flee_base_chance", self.flee_base_chance),
            ("flee_min_chance", self.flee_min_chance),
            ("flee_max_chance", self.flee_max_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within 0..=1"));
            }
        }
        if self.flee_min_chance > self.flee_max_chance {
            return Err(invalid("flee_min_chance", "must not exceed flee_max_chance"));
        }
        if !self.flee_dex_bonus.is_finite() {
            return Err(invalid("flee_dex_bonus", "must be finite"));
        }
        if !(self.defend_bonus_percent.is_finite() && self.defend_bonus_percent >= 0.0) {
            return Err(invalid("defend_bonus_percent", "must be non-negative"));
        }
        if self.critical_multiplier < 1 {
            return Err(invalid("critical_multiplier", "must be at least 1"));
        }
        if self.turn_timeout_secs == 0 {
            return Err(invalid("turn_timeout_secs", "must be positive"));
        }
        if self.combat_timeout_minutes <= 0 {
            return Err(invalid("combat_timeout_minutes", "must be positive"));
        }
        if self.max_npc_turns == 0 {
            return Err(invalid("max_npc_turns", "must be positive"));
        }
        Ok(())
    }

    /// The fight duration ceiling.
    #[must_use]
    pub fn combat_timeout(&self) -> Duration {
        Duration::minutes(self.combat_timeout_minutes)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
