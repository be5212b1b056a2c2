//! Combatant snapshots.
//!
//! A [`Combatant`] is a copy of a character's or NPC's fighting stats taken
//! when the fight starts. The fight mutates the snapshot; the persisted
//! entity only sees the result when the fight ends.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a character or NPC taking part in a fight.
///
/// Ids come from the external directories, so they are opaque strings.
///
/// # Example
///
/// ```
/// use fray_core::combatant::CombatantId;
///
/// let id = CombatantId::new("char-1");
/// assert_eq!(id.as_str(), "char-1");
/// assert_eq!(id.to_string(), "char-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CombatantId(String);

impl CombatantId {
    /// Creates an id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CombatantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CombatantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the user account that controls a player character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which side of the fight a combatant is on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    /// A player-controlled character.
    Player,
    /// A non-player combatant driven by the AI.
    Npc,
}

impl fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Npc => write!(f, "npc"),
        }
    }
}

/// Actions a combatant can take on its turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatAction {
    /// Strike a target.
    Attack,
    /// Raise defense until the next own turn.
    Defend,
    /// Try to leave the fight.
    Flee,
    /// Defend forced by an expired turn timer.
    Timeout,
}

impl fmt::Display for CombatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attack => write!(f, "attack"),
            Self::Defend => write!(f, "defend"),
            Self::Flee => write!(f, "flee"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

bitflags! {
    /// Out-of-fight markers for a combatant.
    ///
    /// An empty set means the combatant is alive and still fighting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CombatantStatus: u8 {
        /// HP dropped to zero.
        const DOWN = 1 << 0;
        /// Escaped the fight.
        const FLED = 1 << 1;
    }
}

/// An action chosen ahead of the combatant's turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// What to do when the turn comes.
    pub action: CombatAction,
    /// Target for an attack; `None` falls back to the auto-attack target.
    pub target: Option<CombatantId>,
}

impl QueuedAction {
    /// Queues an action without a target.
    #[must_use]
    pub fn new(action: CombatAction) -> Self {
        Self {
            action,
            target: None,
        }
    }

    /// Queues an attack on `target`.
    #[must_use]
    pub fn attack(target: CombatantId) -> Self {
        Self {
            action: CombatAction::Attack,
            target: Some(target),
        }
    }
}

/// Combat stats of one participant, copied in when the fight starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    /// Character or NPC id.
    pub id: CombatantId,
    /// Player or NPC.
    pub kind: CombatantKind,
    /// Display name.
    pub name: String,
    /// Controlling user, used to route notifications. Players only.
    pub owner: Option<UserId>,
    /// Rolled initiative (d20 + DEX).
    pub initiative: i32,
    /// Down / fled markers.
    pub status: CombatantStatus,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Current hit points, never below zero.
    pub current_hp: i32,
    /// Base damage of a landed hit.
    pub attack_power: i32,
    /// Armor value; adds to AC and halves into damage reduction.
    pub defense: i32,
    /// Strength modifier, added to to-hit rolls.
    pub str_mod: i32,
    /// Dexterity modifier, added to initiative and flee chance.
    pub dex_mod: i32,
    /// Constitution modifier.
    pub con_mod: i32,
    /// Temporary AC bonus from defending. Cleared when the owner's next turn begins.
    pub defense_bonus: i32,
    /// Action chosen ahead of the combatant's turn.
    pub queued: Option<QueuedAction>,
    /// Persistent target used when an attack names none.
    pub auto_attack_target: Option<CombatantId>,
    /// Consecutive turns that ran out on the clock.
    pub missed_turns: u32,
}

impl Combatant {
    fn base(id: CombatantId, kind: CombatantKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            owner: None,
            initiative: 0,
            status: CombatantStatus::empty(),
            max_hp: 1,
            current_hp: 1,
            attack_power: 1,
            defense: 0,
            str_mod: 0,
            dex_mod: 0,
            con_mod: 0,
            defense_bonus: 0,
            queued: None,
            auto_attack_target: None,
            missed_turns: 0,
        }
    }

    /// Creates a player combatant with 1 HP and no modifiers.
    #[must_use]
    pub fn player(id: impl Into<CombatantId>, name: impl Into<String>) -> Self {
        Self::base(id.into(), CombatantKind::Player, name)
    }

    /// Creates an NPC combatant with 1 HP and no modifiers.
    #[must_use]
    pub fn npc(id: impl Into<CombatantId>, name: impl Into<String>) -> Self {
        Self::base(id.into(), CombatantKind::Npc, name)
    }

    /// Sets current and maximum HP.
    #[must_use]
    pub fn with_hp(mut self, current: i32, max: i32) -> Self {
        self.current_hp = current;
        self.max_hp = max;
        self
    }

    /// Sets attack power and defense.
    #[must_use]
    pub fn with_stats(mut self, attack_power: i32, defense: i32) -> Self {
        self.attack_power = attack_power;
        self.defense = defense;
        self
    }

    /// Sets the STR/DEX/CON modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, str_mod: i32, dex_mod: i32, con_mod: i32) -> Self {
        self.str_mod = str_mod;
        self.dex_mod = dex_mod;
        self.con_mod = con_mod;
        self
    }

    /// Sets the controlling user.
    #[must_use]
    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// True while HP is above zero.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.status.contains(CombatantStatus::DOWN)
    }

    /// True once the combatant escaped.
    #[must_use]
    pub fn has_fled(&self) -> bool {
        self.status.contains(CombatantStatus::FLED)
    }

    /// Alive and still on the field.
    #[must_use]
    pub fn can_act(&self) -> bool {
        self.status.is_empty()
    }

    /// True for player characters.
    #[must_use]
    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    /// Current HP as a fraction of max HP. A non-positive max counts as empty.
    #[must_use]
    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp <= 0 {
            return 0.0;
        }
        f64::from(self.current_hp) / f64::from(self.max_hp)
    }

    /// Subtracts `amount` HP, flooring at zero.
    ///
    /// Returns true when this hit took the combatant down.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        self.current_hp = self.current_hp.saturating_sub(amount).max(0);
        if self.current_hp == 0 && self.is_alive() {
            self.status.insert(CombatantStatus::DOWN);
            return true;
        }
        false
    }

    /// Marks the combatant as escaped.
    pub fn mark_fled(&mut self) {
        self.status.insert(CombatantStatus::FLED);
    }
}
