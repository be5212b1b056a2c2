//! Combat instance: the record of one fight.
//!
//! A [`CombatInstance`] owns every [`Combatant`] taking part in a fight in a
//! single arena (`Vec<Combatant>`). The player roster, the enemy roster and
//! the turn order are lists of [`Slot`]s into that arena, so there is exactly
//! one copy of each combatant and mutating it through any view is visible
//! through all of them.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use fray_core::combatant::Combatant;
//! use fray_core::instance::{CombatInstance, CombatState, RoomId};
//!
//! let mut fight = CombatInstance::new(RoomId::new("crypt"), Utc::now());
//! let hero = fight.add_player(Combatant::player("p1", "Ayla").with_hp(20, 20)).unwrap();
//! fight.add_enemy(Combatant::npc("n1", "Ghoul").with_hp(12, 12)).unwrap();
//!
//! assert_eq!(fight.state(), CombatState::Pending);
//! assert_eq!(fight.round(), 1);
//! assert_eq!(fight.combatant(hero).unwrap().name, "Ayla");
//!
//! // Writes through the arena are seen by every roster view.
//! fight.get_mut(&"p1".into()).unwrap().current_hp = 5;
//! assert_eq!(fight.players().next().unwrap().current_hp, 5);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::combatant::{CombatAction, Combatant, CombatantId};

/// Default seconds a player has to act before the turn times out.
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique id of a combat instance (UUID v4).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InstanceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Id of the room a fight started in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a room id.
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

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Position of a combatant in an instance's arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot(usize);

impl Slot {
    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a fight.
///
/// `Pending` and `Active` are the only non-terminal states. Reaching any other
/// state means the fight is over and must be cleaned up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatState {
    /// Created, turn order not built yet.
    Pending,
    /// Turns are being taken.
    Active,
    /// Every enemy is down.
    Victory,
    /// Every player is down or gone, at least one down.
    Defeat,
    /// Every player escaped or was dragged out, nobody died.
    Fled,
    /// The fight ran past the global duration ceiling.
    Timeout,
}

impl CombatState {
    /// True for states that end the fight.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for CombatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Victory => "victory",
            Self::Defeat => "defeat",
            Self::Fled => "fled",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Combat Log
// =============================================================================

/// Result tag of a logged action.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    /// Attack landed.
    Hit,
    /// Attack landed on a natural 20.
    Critical,
    /// Attack failed.
    Miss,
    /// Defensive stance taken.
    Defended,
    /// Flee attempt succeeded.
    Fled,
    /// Flee attempt failed.
    Blocked,
}

/// One line of the combat log.
///
/// Narration lines (round banners, start and end messages) carry no actor
/// and no action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Round the entry belongs to.
    pub round: u32,
    /// Acting combatant.
    pub actor: Option<CombatantId>,
    /// Acting combatant's name at the time.
    pub actor_name: Option<String>,
    /// What the actor did.
    pub action: Option<CombatAction>,
    /// Target of the action.
    pub target: Option<CombatantId>,
    /// Target's name at the time.
    pub target_name: Option<String>,
    /// How it went.
    pub outcome: Option<LogOutcome>,
    /// Damage dealt, zero when none.
    pub damage: i32,
    /// Human-readable description.
    pub message: String,
}

impl CombatLogEntry {
    /// A narration line with no actor.
    #[must_use]
    pub fn narration(message: impl Into<String>) -> Self {
        Self {
            timestamp: DateTime::<Utc>::MIN_UTC,
            round: 0,
            actor: None,
            actor_name: None,
            action: None,
            target: None,
            target_name: None,
            outcome: None,
            damage: 0,
            message: message.into(),
        }
    }

    /// An action taken by `actor`.
    #[must_use]
    pub fn action(
        actor: &Combatant,
        action: CombatAction,
        outcome: LogOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            actor: Some(actor.id.clone()),
            actor_name: Some(actor.name.clone()),
            action: Some(action),
            outcome: Some(outcome),
            ..Self::narration(message)
        }
    }

    /// Attaches a target.
    #[must_use]
    pub fn with_target(mut self, target: &Combatant) -> Self {
        self.target = Some(target.id.clone());
        self.target_name = Some(target.name.clone());
        self
    }

    /// Attaches dealt damage.
    #[must_use]
    pub fn with_damage(mut self, damage: i32) -> Self {
        self.damage = damage;
        self
    }
}

// =============================================================================
// Combat Instance
// =============================================================================

/// One isolated fight.
///
/// Owned by the [`Manager`](crate::manager::Manager) once registered; mutated
/// only through a checked-out [`CombatSession`](crate::manager::CombatSession).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatInstance {
    id: InstanceId,
    origin_room: RoomId,
    /// Every participant, in insertion order.
    combatants: Vec<Combatant>,
    players: Vec<Slot>,
    enemies: Vec<Slot>,
    /// Combatants that could act when the round started, by initiative.
    turn_order: Vec<Slot>,
    current_turn: usize,
    round: u32,
    state: CombatState,
    created_at: DateTime<Utc>,
    last_action_at: DateTime<Utc>,
    turn_started_at: DateTime<Utc>,
    turn_timeout_secs: u64,
    log: Vec<CombatLogEntry>,
}

impl CombatInstance {
    /// Creates an empty, pending fight in `origin_room`.
    #[must_use]
    pub fn new(origin_room: RoomId, now: DateTime<Utc>) -> Self {
        Self {
            id: InstanceId::new_v4(),
            origin_room,
            combatants: Vec::new(),
            players: Vec::new(),
            enemies: Vec::new(),
            turn_order: Vec::new(),
            current_turn: 0,
            round: 1,
            state: CombatState::Pending,
            created_at: now,
            last_action_at: now,
            turn_started_at: now,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            log: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Instance id.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Room the fight started in.
    #[must_use]
    pub fn origin_room(&self) -> &RoomId {
        &self.origin_room
    }

    /// Current round, starting at 1.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CombatState {
        self.state
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last turn change.
    #[must_use]
    pub const fn last_action_at(&self) -> DateTime<Utc> {
        self.last_action_at
    }

    /// Time the current turn started.
    #[must_use]
    pub const fn turn_started_at(&self) -> DateTime<Utc> {
        self.turn_started_at
    }

    /// Seconds a player has to act.
    #[must_use]
    pub const fn turn_timeout_secs(&self) -> u64 {
        self.turn_timeout_secs
    }

    /// Changes the per-turn timeout.
    pub fn set_turn_timeout_secs(&mut self, secs: u64) {
        self.turn_timeout_secs = secs;
    }

    /// The append-only combat log.
    #[must_use]
    pub fn log(&self) -> &[CombatLogEntry] {
        &self.log
    }

    // -------------------------------------------------------------------------
    // Roster
    // -------------------------------------------------------------------------

    /// Adds a player. Returns `None` if the id is already in the fight.
    pub fn add_player(&mut self, combatant: Combatant) -> Option<Slot> {
        let slot = self.insert(combatant)?;
        self.players.push(slot);
        Some(slot)
    }

    /// Adds an enemy. Returns `None` if the id is already in the fight.
    pub fn add_enemy(&mut self, combatant: Combatant) -> Option<Slot> {
        let slot = self.insert(combatant)?;
        self.enemies.push(slot);
        Some(slot)
    }

    fn insert(&mut self, combatant: Combatant) -> Option<Slot> {
        if self.slot_of(&combatant.id).is_some() {
            return None;
        }
        let slot = Slot(self.combatants.len());
        self.combatants.push(combatant);
        Some(slot)
    }

    /// Combatant stored at `slot`.
    #[must_use]
    pub fn combatant(&self, slot: Slot) -> Option<&Combatant> {
        self.combatants.get(slot.0)
    }

    /// Mutable combatant stored at `slot`.
    #[must_use]
    pub fn combatant_mut(&mut self, slot: Slot) -> Option<&mut Combatant> {
        self.combatants.get_mut(slot.0)
    }

    /// Arena slot of the combatant with `id`.
    #[must_use]
    pub fn slot_of(&self, id: &CombatantId) -> Option<Slot> {
        self.combatants.iter().position(|c| &c.id == id).map(Slot)
    }

    /// Finds a combatant on either side.
    #[must_use]
    pub fn get(&self, id: &CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    /// Finds a combatant on either side, mutably.
    #[must_use]
    pub fn get_mut(&mut self, id: &CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| &c.id == id)
    }

    /// Finds a combatant on the player roster.
    #[must_use]
    pub fn player(&self, id: &CombatantId) -> Option<&Combatant> {
        self.players().find(|c| &c.id == id)
    }

    /// Finds a combatant on the enemy roster.
    #[must_use]
    pub fn enemy(&self, id: &CombatantId) -> Option<&Combatant> {
        self.enemies().find(|c| &c.id == id)
    }

    /// Every participant in insertion order.
    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.combatants.iter()
    }

    /// Player roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.players.iter().map(|s| &self.combatants[s.0])
    }

    /// Enemy roster in join order.
    pub fn enemies(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.enemies.iter().map(|s| &self.combatants[s.0])
    }

    /// Player roster slots.
    #[must_use]
    pub fn player_slots(&self) -> &[Slot] {
        &self.players
    }

    /// Enemy roster slots.
    #[must_use]
    pub fn enemy_slots(&self) -> &[Slot] {
        &self.enemies
    }

    /// Players still able to fight.
    pub fn living_players(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.players().filter(|c| c.can_act())
    }

    /// Enemies still able to fight.
    pub fn living_enemies(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.enemies().filter(|c| c.can_act())
    }

    // -------------------------------------------------------------------------
    // End-condition predicates
    // -------------------------------------------------------------------------

    /// True when there is at least one enemy and none is alive.
    #[must_use]
    pub fn all_enemies_dead(&self) -> bool {
        !self.enemies.is_empty() && self.enemies().all(|c| !c.is_alive())
    }

    /// True when no player is able to fight.
    #[must_use]
    pub fn all_players_down(&self) -> bool {
        self.players().all(|c| !c.can_act())
    }

    /// True when no player can fight, at least one fled and none died.
    #[must_use]
    pub fn all_players_fled(&self) -> bool {
        self.all_players_down()
            && self.players().any(Combatant::has_fled)
            && self.players().all(Combatant::is_alive)
    }

    // -------------------------------------------------------------------------
    // Turn order
    // -------------------------------------------------------------------------

    /// Turn order for the current round.
    pub fn turn_order(&self) -> impl Iterator<Item = &Combatant> + '_ {
        self.turn_order.iter().map(|s| &self.combatants[s.0])
    }

    /// Turn order slots for the current round.
    #[must_use]
    pub fn turn_order_slots(&self) -> &[Slot] {
        &self.turn_order
    }

    /// Cursor into the turn order. May equal its length between rounds.
    #[must_use]
    pub const fn current_turn_index(&self) -> usize {
        self.current_turn
    }

    /// Slot of the combatant whose turn it is.
    #[must_use]
    pub fn current_slot(&self) -> Option<Slot> {
        self.turn_order.get(self.current_turn).copied()
    }

    /// The combatant whose turn it is.
    #[must_use]
    pub fn current(&self) -> Option<&Combatant> {
        self.current_slot().and_then(|s| self.combatant(s))
    }

    /// True when the current turn belongs to a player.
    #[must_use]
    pub fn is_player_turn(&self) -> bool {
        self.current().is_some_and(Combatant::is_player)
    }

    /// Whole seconds left before the current turn times out.
    #[must_use]
    pub fn turn_time_remaining(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.turn_started_at).num_seconds().max(0);
        self.turn_timeout_secs
            .saturating_sub(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    /// True once the current turn has run for the full timeout.
    #[must_use]
    pub fn is_turn_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.turn_time_remaining(now) == 0
    }

    /// Appends a log entry stamped with `now` and the current round.
    pub fn add_log(&mut self, mut entry: CombatLogEntry, now: DateTime<Utc>) {
        entry.timestamp = now;
        entry.round = self.round;
        self.log.push(entry);
    }

    // -------------------------------------------------------------------------
    // Engine-only mutation
    // -------------------------------------------------------------------------

    pub(crate) fn set_state(&mut self, state: CombatState) {
        self.state = state;
    }

    pub(crate) fn set_turn_order(&mut self, order: Vec<Slot>) {
        self.turn_order = order;
        self.current_turn = 0;
    }

    pub(crate) fn advance_cursor(&mut self) {
        self.current_turn += 1;
    }

    pub(crate) fn next_round(&mut self) {
        self.round += 1;
    }

    pub(crate) fn start_turn(&mut self, now: DateTime<Utc>) {
        self.turn_started_at = now;
        self.last_action_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn skirmish() -> CombatInstance {
        let mut fight = CombatInstance::new(RoomId::new("hall"), t0());
        fight.add_player(Combatant::player("p1", "Ayla").with_hp(20, 20));
        fight.add_player(Combatant::player("p2", "Bram").with_hp(15, 15));
        fight.add_enemy(Combatant::npc("n1", "Ghoul").with_hp(10, 10));
        fight
    }

    mod roster_tests {
        use super::*;

        #[test]
        fn new_instance_is_pending_round_one() {
            let fight = CombatInstance::new(RoomId::new("hall"), t0());
            assert_eq!(fight.state(), CombatState::Pending);
            assert_eq!(fight.round(), 1);
            assert_eq!(fight.turn_timeout_secs(), DEFAULT_TURN_TIMEOUT_SECS);
            assert!(fight.current().is_none());
            assert!(!fight.is_player_turn());
        }

        #[test]
        fn duplicate_ids_are_rejected() {
            let mut fight = skirmish();
            assert!(fight.add_enemy(Combatant::npc("p1", "Mimic")).is_none());
            assert_eq!(fight.combatants().count(), 3);
        }

        #[test]
        fn lookups_respect_sides() {
            let fight = skirmish();
            let p1 = CombatantId::new("p1");
            let n1 = CombatantId::new("n1");
            assert!(fight.player(&p1).is_some());
            assert!(fight.enemy(&p1).is_none());
            assert!(fight.enemy(&n1).is_some());
            assert!(fight.get(&CombatantId::new("ghost")).is_none());
        }

        #[test]
        fn single_copy_visible_through_every_view() {
            let mut fight = skirmish();
            let slot = fight.slot_of(&"n1".into()).unwrap();
            fight.set_turn_order(vec![slot]);
            fight.combatant_mut(slot).unwrap().current_hp = 3;
            assert_eq!(fight.current().unwrap().current_hp, 3);
            assert_eq!(fight.enemies().next().unwrap().current_hp, 3);
        }
    }

    mod predicate_tests {
        use super::*;

        #[test]
        fn enemies_dead_requires_non_empty_roster() {
            let mut fight = CombatInstance::new(RoomId::new("hall"), t0());
            fight.add_player(Combatant::player("p1", "Ayla"));
            assert!(!fight.all_enemies_dead());
        }

        #[test]
        fn enemies_dead_after_kill() {
            let mut fight = skirmish();
            fight.get_mut(&"n1".into()).unwrap().take_damage(50);
            assert!(fight.all_enemies_dead());
            assert_eq!(fight.living_enemies().count(), 0);
        }

        #[test]
        fn escaped_enemy_is_not_dead() {
            let mut fight = skirmish();
            fight.get_mut(&"n1".into()).unwrap().mark_fled();
            assert!(!fight.all_enemies_dead());
            assert_eq!(fight.living_enemies().count(), 0);
        }

        #[test]
        fn players_fled_needs_nobody_dead() {
            let mut fight = skirmish();
            fight.get_mut(&"p1".into()).unwrap().mark_fled();
            fight.get_mut(&"p2".into()).unwrap().mark_fled();
            assert!(fight.all_players_fled());

            fight.get_mut(&"p2".into()).unwrap().take_damage(100);
            assert!(fight.all_players_down());
            assert!(!fight.all_players_fled());
        }
    }

    mod timing_tests {
        use super::*;

        #[test]
        fn turn_time_counts_down() {
            let mut fight = skirmish();
            fight.start_turn(t0());
            assert_eq!(fight.turn_time_remaining(t0() + Duration::seconds(15)), 45);
            assert!(!fight.is_turn_timed_out(t0() + Duration::seconds(59)));
            assert!(fight.is_turn_timed_out(t0() + Duration::seconds(60)));
            assert_eq!(fight.turn_time_remaining(t0() + Duration::seconds(600)), 0);
        }

        #[test]
        fn log_entries_take_round_and_time() {
            let mut fight = skirmish();
            fight.next_round();
            fight.add_log(CombatLogEntry::narration("--- Round 2 ---"), t0());
            let entry = &fight.log()[0];
            assert_eq!(entry.round, 2);
            assert_eq!(entry.timestamp, t0());
            assert!(entry.actor.is_none());
        }
    }
}
