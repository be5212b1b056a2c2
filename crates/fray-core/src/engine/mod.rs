//! Combat ruleset.
//!
//! The [`Engine`] owns the rules configuration and the dice. Every operation
//! takes the [`CombatInstance`] it works on explicitly, together with the
//! current time, so the same engine can drive any number of fights and tests
//! never wait on a real clock.
//!
//! # Turn structure
//!
//! Initiative is `1d20 + DEX`. At the start of each round the turn order is
//! rebuilt from the combatants still able to fight: players first, then
//! enemies, stable-sorted by initiative (highest first). [`Engine::next_turn`]
//! walks that order, skipping anyone who went down or fled mid-round, and
//! starts a new round when it runs past the end.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use fray_core::combatant::Combatant;
//! use fray_core::config::CombatConfig;
//! use fray_core::engine::Engine;
//! use fray_core::instance::{CombatInstance, RoomId};
//! use fray_dice::ScriptedDice;
//!
//! let now = Utc::now();
//! let mut engine = Engine::new(CombatConfig::default(), ScriptedDice::new([15]));
//! let mut fight = CombatInstance::new(RoomId::new("crypt"), now);
//! fight.add_player(Combatant::player("p1", "Ayla").with_stats(6, 0).with_modifiers(3, 0, 0));
//! fight.add_enemy(Combatant::npc("n1", "Ghoul").with_hp(10, 10).with_stats(2, 5));
//!
//! let hit = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), now);
//! assert!(hit.hit);
//! assert_eq!(hit.to_hit, Some(18));
//! assert_eq!(hit.armor_class, Some(15));
//! assert_eq!(hit.damage, 4);
//! ```

mod actions;
mod ai;

pub use actions::{AttackOutcome, DefendOutcome, FleeOutcome, Resolution};
pub use ai::choose_npc_action;

use chrono::{DateTime, Utc};
use fray_dice::{Dice, Die, Roll, SeededDice};
use tracing::{debug, info, warn};

use crate::combatant::{CombatAction, Combatant, CombatantId};
use crate::config::CombatConfig;
use crate::directory::{ability_modifier, Character, Npc};
use crate::instance::{CombatInstance, CombatLogEntry, CombatState, InstanceId, RoomId, Slot};
use crate::manager::Manager;

// =============================================================================
// Snapshots
// =============================================================================

/// Copies a character's fighting stats into a combatant.
///
/// Attack power is weapon damage plus the STR modifier, never below 1.
#[must_use]
pub fn combatant_from_character(character: &Character) -> Combatant {
    let str_mod = ability_modifier(character.strength);
    Combatant::player(character.id.clone(), character.name.clone())
        .with_owner(character.owner.clone())
        .with_hp(character.current_hp, character.max_hp)
        .with_stats(
            character.weapon_damage.saturating_add(str_mod).max(1),
            character.armor_defense,
        )
        .with_modifiers(
            str_mod,
            ability_modifier(character.dexterity),
            ability_modifier(character.constitution),
        )
}

/// Copies an NPC's enemy stats into a combatant.
///
/// Returns `None` for NPCs that cannot be fought. Every modifier is a
/// quarter of the NPC's level.
#[must_use]
pub fn combatant_from_npc(npc: &Npc) -> Option<Combatant> {
    let enemy = npc.enemy.as_ref()?;
    let level_mod = npc.level / 4;
    Some(
        Combatant::npc(npc.id.clone(), npc.name.clone())
            .with_hp(npc.current_hp, npc.max_hp)
            .with_stats(enemy.attack_power, enemy.defense)
            .with_modifiers(level_mod, level_mod, level_mod),
    )
}

// =============================================================================
// Engine
// =============================================================================

/// Applies the combat rules to instances.
#[derive(Debug)]
pub struct Engine<D: Dice = SeededDice> {
    config: CombatConfig,
    dice: D,
}

impl<D: Dice> Engine<D> {
    /// Creates an engine rolling with `dice`.
    pub fn new(config: CombatConfig, dice: D) -> Self {
        Self { config, dice }
    }

    /// The active rules.
    #[must_use]
    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// The dice, e.g. to queue scripted faces.
    pub fn dice_mut(&mut self) -> &mut D {
        &mut self.dice
    }

    /// Rolls `1d20 + DEX` and stores the total as the combatant's initiative.
    pub fn roll_initiative(&mut self, combatant: &mut Combatant) -> Roll {
        let roll = Roll::new(Die::D20, self.dice.roll(Die::D20), combatant.dex_mod);
        combatant.initiative = roll.total();
        roll
    }

    /// Starts a fight in `room` and registers it with `manager`.
    ///
    /// Rolls initiative for every participant, builds the turn order and
    /// moves the instance to `Active`. NPCs that cannot be fought and ids
    /// that appear twice are skipped.
    pub fn initiate_combat(
        &mut self,
        manager: &Manager,
        room: RoomId,
        characters: &[Character],
        npcs: &[Npc],
        now: DateTime<Utc>,
    ) -> InstanceId {
        let mut instance = CombatInstance::new(room, now);
        instance.set_turn_timeout_secs(self.config.turn_timeout_secs);

        for character in characters {
            let mut combatant = combatant_from_character(character);
            self.roll_initiative(&mut combatant);
            if instance.add_player(combatant).is_none() {
                warn!(character_id = %character.id, "duplicate combatant skipped");
            }
        }
        for npc in npcs {
            let Some(mut combatant) = combatant_from_npc(npc) else {
                warn!(npc_id = %npc.id, "npc without enemy stats skipped");
                continue;
            };
            self.roll_initiative(&mut combatant);
            if instance.add_enemy(combatant).is_none() {
                warn!(npc_id = %npc.id, "duplicate combatant skipped");
            }
        }

        self.build_turn_order(&mut instance);
        instance.set_state(CombatState::Active);
        instance.start_turn(now);
        let message = format!("Combat begins! Round {}", instance.round());
        instance.add_log(CombatLogEntry::narration(message), now);

        let players: Vec<CombatantId> = instance.players().map(|c| c.id.clone()).collect();
        let enemies: Vec<CombatantId> = instance.enemies().map(|c| c.id.clone()).collect();
        info!(
            room_id = %instance.origin_room(),
            players = players.len(),
            enemies = enemies.len(),
            "combat initiated"
        );

        let id = manager.insert_instance(instance);
        for player in players {
            manager.register_player(player, id);
        }
        for npc in enemies {
            manager.register_npc(npc, id);
        }
        id
    }

    /// Rebuilds the turn order from everyone still able to fight and puts
    /// the cursor on its first entry.
    pub fn build_turn_order(&self, instance: &mut CombatInstance) {
        let order = initiative_order(instance);
        instance.set_turn_order(order);
    }

    /// Moves the turn to the next combatant able to act.
    ///
    /// Running past the end of the order starts a new round: the round
    /// counter goes up by one and the order is rebuilt. The defense bonus of
    /// the combatant whose turn begins is cleared and the turn timer restarts.
    ///
    /// Returns the id of the new current combatant, or `None` when nobody
    /// can act any more.
    pub fn next_turn(&self, instance: &mut CombatInstance, now: DateTime<Utc>) -> Option<CombatantId> {
        loop {
            instance.advance_cursor();
            match instance.current_slot() {
                Some(slot) => {
                    if instance.combatant(slot).is_some_and(Combatant::can_act) {
                        return begin_turn(instance, slot, now);
                    }
                }
                None => {
                    let order = initiative_order(instance);
                    let first = *order.first()?;
                    instance.next_round();
                    instance.set_turn_order(order);
                    let banner = format!("--- Round {} ---", instance.round());
                    instance.add_log(CombatLogEntry::narration(banner), now);
                    debug!(instance_id = %instance.id(), round = instance.round(), "new round");
                    return begin_turn(instance, first, now);
                }
            }
        }
    }

    /// Decides whether the fight is over.
    ///
    /// Checked in order: every enemy dead is a `Victory`; no player able to
    /// fight with at least one dead (or no players at all) is a `Defeat`;
    /// every player gone with nobody dead is `Fled`; running past the
    /// duration ceiling is a `Timeout`. Returns `None` while the fight goes
    /// on.
    ///
    /// Enemies that fled are still alive, so they never count towards a
    /// `Victory`. A fight whose remaining enemies all fled goes on until the
    /// players leave or the ceiling is reached.
    #[must_use]
    pub fn check_combat_end(&self, instance: &CombatInstance, now: DateTime<Utc>) -> Option<CombatState> {
        if instance.all_enemies_dead() {
            return Some(CombatState::Victory);
        }
        let no_players = instance.player_slots().is_empty();
        let any_dead = instance.players().any(|c| !c.is_alive());
        if no_players || (instance.all_players_down() && any_dead) {
            return Some(CombatState::Defeat);
        }
        if instance.all_players_fled() {
            return Some(CombatState::Fled);
        }
        if now - instance.created_at() >= self.config.combat_timeout() {
            return Some(CombatState::Timeout);
        }
        None
    }

    /// Moves the fight to a terminal state and logs it.
    pub fn end_combat(&self, instance: &mut CombatInstance, state: CombatState, now: DateTime<Utc>) {
        instance.set_state(state);
        instance.add_log(CombatLogEntry::narration(format!("Combat ended: {state}")), now);
        info!(
            instance_id = %instance.id(),
            state = %state,
            rounds = instance.round(),
            "combat ended"
        );
    }

    /// Picks an NPC's action using its stored flee threshold.
    #[must_use]
    pub fn npc_action(
        &self,
        instance: &CombatInstance,
        npc: &CombatantId,
        entity: Option<&Npc>,
    ) -> (CombatAction, Option<CombatantId>) {
        let threshold = entity
            .and_then(|n| n.enemy.as_ref())
            .map_or(0.0, |e| e.flee_threshold);
        choose_npc_action(instance, npc, threshold)
    }

    pub(crate) fn roll(&mut self, die: Die) -> u32 {
        self.dice.roll(die)
    }
}

fn initiative_order(instance: &CombatInstance) -> Vec<Slot> {
    let mut order: Vec<Slot> = instance
        .player_slots()
        .iter()
        .chain(instance.enemy_slots())
        .copied()
        .filter(|&slot| instance.combatant(slot).is_some_and(Combatant::can_act))
        .collect();
    order.sort_by_key(|&slot| {
        std::cmp::Reverse(instance.combatant(slot).map_or(i32::MIN, |c| c.initiative))
    });
    order
}

fn begin_turn(instance: &mut CombatInstance, slot: Slot, now: DateTime<Utc>) -> Option<CombatantId> {
    instance.start_turn(now);
    let combatant = instance.combatant_mut(slot)?;
    combatant.defense_bonus = 0;
    Some(combatant.id.clone())
}
