//! Attack, defend and flee resolution.
//!
//! Invalid references and actors who are already out of the fight never
//! fail loudly: they produce an outcome with a message and no effect.

use chrono::{DateTime, Utc};
use fray_dice::{Dice, Die, Roll};
use tracing::debug;

use super::Engine;
use crate::combatant::{CombatAction, CombatantId};
use crate::instance::{CombatInstance, CombatLogEntry, LogOutcome};

/// Result of an attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    /// The attack landed.
    pub hit: bool,
    /// A natural 20 came up.
    pub critical: bool,
    /// HP removed from the target.
    pub damage: i32,
    /// This hit took the target down.
    pub target_died: bool,
    /// The d20 roll with the STR modifier; `None` when no roll was made.
    pub roll: Option<Roll>,
    /// Modified to-hit total.
    pub to_hit: Option<i32>,
    /// Target's armor class at the time of the attack.
    pub armor_class: Option<i32>,
    /// Narration.
    pub message: String,
}

impl AttackOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            hit: false,
            critical: false,
            damage: 0,
            target_died: false,
            roll: None,
            to_hit: None,
            armor_class: None,
            message: message.to_string(),
        }
    }

    /// True when the attack did not land.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        !self.hit
    }
}

/// Result of taking a defensive stance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefendOutcome {
    /// False when the defender could not act.
    pub applied: bool,
    /// AC bonus granted until the defender's next turn.
    pub bonus: i32,
    /// Narration.
    pub message: String,
}

/// Result of a flee attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FleeOutcome {
    /// The combatant escaped.
    pub success: bool,
    /// The d100 roll; `None` when no roll was made.
    pub roll: Option<u32>,
    /// Escape chance in percent.
    pub chance_percent: u32,
    /// Narration.
    pub message: String,
}

impl FleeOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            roll: None,
            chance_percent: 0,
            message: message.to_string(),
        }
    }
}

/// Outcome of any combat action.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An attack was made.
    Attack(AttackOutcome),
    /// A defensive stance was taken, by choice or on timeout.
    Defend(DefendOutcome),
    /// An escape was attempted.
    Flee(FleeOutcome),
}

impl Resolution {
    /// Narration of whatever happened.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Attack(outcome) => &outcome.message,
            Self::Defend(outcome) => &outcome.message,
            Self::Flee(outcome) => &outcome.message,
        }
    }
}

impl<D: Dice> Engine<D> {
    /// Resolves an attack of `attacker` on `target`.
    ///
    /// The attacker rolls `1d20 + STR` against `10 + defense + defense bonus`.
    /// A natural 20 always hits and multiplies the damage; a natural 1 always
    /// misses. Damage is `attack power - defense / 2`, at least 1.
    pub fn process_attack(
        &mut self,
        instance: &mut CombatInstance,
        attacker: &CombatantId,
        target: &CombatantId,
        now: DateTime<Utc>,
    ) -> AttackOutcome {
        let (Some(attacker_slot), Some(target_slot)) =
            (instance.slot_of(attacker), instance.slot_of(target))
        else {
            return AttackOutcome::rejected("Invalid attacker or target");
        };
        let (Some(a), Some(t)) = (
            instance.combatant(attacker_slot).cloned(),
            instance.combatant(target_slot),
        ) else {
            return AttackOutcome::rejected("Invalid attacker or target");
        };
        if !a.is_alive() {
            return AttackOutcome::rejected("Attacker is dead");
        }
        if a.has_fled() {
            return AttackOutcome::rejected("Attacker has left the fight");
        }
        if !t.is_alive() {
            return AttackOutcome::rejected("Target is already dead");
        }
        if t.has_fled() {
            return AttackOutcome::rejected("Target has fled");
        }
        let target_defense = t.defense;
        let armor_class = 10i32.saturating_add(t.defense).saturating_add(t.defense_bonus);

        let roll = Roll::new(Die::D20, self.roll(Die::D20), a.str_mod);
        let to_hit = roll.total();
        let critical = roll.is_natural_max();
        let hit = critical || (!roll.is_natural_min() && to_hit >= armor_class);

        let mut outcome = AttackOutcome {
            hit,
            critical,
            damage: 0,
            target_died: false,
            roll: Some(roll),
            to_hit: Some(to_hit),
            armor_class: Some(armor_class),
            message: String::new(),
        };

        let Some(t) = instance.combatant_mut(target_slot) else {
            return AttackOutcome::rejected("Invalid attacker or target");
        };
        let log_outcome = if !hit {
            outcome.message = if roll.is_natural_min() {
                format!("{} swings wildly at {} but completely misses!", a.name, t.name)
            } else {
                format!(
                    "{} attacks {} but misses! (Roll: {roll} vs AC {armor_class})",
                    a.name, t.name
                )
            };
            LogOutcome::Miss
        } else {
            let mut damage = a.attack_power.saturating_sub(target_defense / 2).max(1);
            if critical {
                damage = damage.saturating_mul(self.config.critical_multiplier).max(1);
            }
            outcome.damage = damage;
            outcome.target_died = t.take_damage(damage);
            outcome.message = if critical {
                format!("CRITICAL HIT! {} strikes {} for {damage} damage!", a.name, t.name)
            } else {
                format!(
                    "{} hits {} for {damage} damage. (Roll: {roll} vs AC {armor_class})",
                    a.name, t.name
                )
            };
            if outcome.target_died {
                outcome.message.push_str(&format!(" {} has been defeated!", t.name));
            } else {
                outcome
                    .message
                    .push_str(&format!(" ({}/{} HP)", t.current_hp, t.max_hp));
            }
            if critical {
                LogOutcome::Critical
            } else {
                LogOutcome::Hit
            }
        };

        let entry = CombatLogEntry::action(&a, CombatAction::Attack, log_outcome, outcome.message.clone())
            .with_target(t)
            .with_damage(outcome.damage);
        instance.add_log(entry, now);
        debug!(
            instance_id = %instance.id(),
            attacker = %attacker,
            target = %target,
            hit,
            critical,
            damage = outcome.damage,
            "attack resolved"
        );
        outcome
    }

    /// Puts `defender` into a defensive stance until its next turn begins.
    ///
    /// The bonus is half of the defender's defense, at least 2.
    pub fn process_defend(
        &mut self,
        instance: &mut CombatInstance,
        defender: &CombatantId,
        now: DateTime<Utc>,
    ) -> DefendOutcome {
        self.defend_as(instance, defender, CombatAction::Defend, now)
    }

    /// AC bonus granted for defending with `defense`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn defend_bonus(&self, defense: i32) -> i32 {
        let scaled = (f64::from(defense) * self.config.defend_bonus_percent).floor() as i32;
        scaled.max(self.config.min_defend_bonus)
    }

    fn defend_as(
        &mut self,
        instance: &mut CombatInstance,
        defender: &CombatantId,
        action: CombatAction,
        now: DateTime<Utc>,
    ) -> DefendOutcome {
        let Some(c) = instance.get(defender) else {
            return DefendOutcome {
                applied: false,
                bonus: 0,
                message: "Invalid defender".to_string(),
            };
        };
        if !c.can_act() {
            return DefendOutcome {
                applied: false,
                bonus: 0,
                message: format!("{} cannot act", c.name),
            };
        }
        let bonus = self.defend_bonus(c.defense);
        let Some(c) = instance.get_mut(defender) else {
            return DefendOutcome {
                applied: false,
                bonus: 0,
                message: "Invalid defender".to_string(),
            };
        };
        c.defense_bonus = bonus;
        let message = if action == CombatAction::Timeout {
            format!(
                "{} hesitates and falls back into a defensive stance. (+{bonus} defense until next turn)",
                c.name
            )
        } else {
            format!(
                "{} takes a defensive stance! (+{bonus} defense until next turn)",
                c.name
            )
        };
        let entry = CombatLogEntry::action(c, action, LogOutcome::Defended, message.clone());
        instance.add_log(entry, now);
        DefendOutcome {
            applied: true,
            bonus,
            message,
        }
    }

    /// Chance to escape for a given DEX modifier, clamped to the configured
    /// bounds.
    #[must_use]
    pub fn flee_chance(&self, dex_mod: i32) -> f64 {
        let config = &self.config;
        (config.flee_base_chance + f64::from(dex_mod) * config.flee_dex_bonus)
            .clamp(config.flee_min_chance, config.flee_max_chance)
    }

    /// Attempts to escape the fight.
    ///
    /// Rolls `1d100`; a roll at or under the escape chance (in percent)
    /// succeeds and marks the combatant as fled. Failure only costs the turn.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn process_flee(
        &mut self,
        instance: &mut CombatInstance,
        fleeing: &CombatantId,
        now: DateTime<Utc>,
    ) -> FleeOutcome {
        let Some(c) = instance.get(fleeing) else {
            return FleeOutcome::rejected("Invalid combatant");
        };
        if !c.can_act() {
            return FleeOutcome::rejected("Already out of the fight");
        }
        let chance_percent = (self.flee_chance(c.dex_mod) * 100.0).round() as u32;
        let roll = self.roll(Die::D100);
        let success = roll <= chance_percent;

        let Some(c) = instance.get_mut(fleeing) else {
            return FleeOutcome::rejected("Invalid combatant");
        };
        let message = if success {
            c.mark_fled();
            c.queued = None;
            format!(
                "{} successfully flees from combat! (Roll: {roll} <= {chance_percent}%)",
                c.name
            )
        } else {
            format!(
                "{} tries to flee but fails! The enemies block the escape. (Roll: {roll} > {chance_percent}%)",
                c.name
            )
        };
        let log_outcome = if success {
            LogOutcome::Fled
        } else {
            LogOutcome::Blocked
        };
        let entry = CombatLogEntry::action(c, CombatAction::Flee, log_outcome, message.clone());
        instance.add_log(entry, now);
        debug!(instance_id = %instance.id(), combatant = %fleeing, roll, chance_percent, success, "flee resolved");
        FleeOutcome {
            success,
            roll: Some(roll),
            chance_percent,
            message,
        }
    }

    /// Carries out `action` for `actor`.
    ///
    /// Attacks without a target fall back to a defensive stance. `Timeout`
    /// is a forced defensive stance logged as such.
    pub fn resolve(
        &mut self,
        instance: &mut CombatInstance,
        actor: &CombatantId,
        action: CombatAction,
        target: Option<&CombatantId>,
        now: DateTime<Utc>,
    ) -> Resolution {
        match (action, target) {
            (CombatAction::Attack, Some(target)) => {
                Resolution::Attack(self.process_attack(instance, actor, target, now))
            }
            (CombatAction::Attack | CombatAction::Defend, _) => {
                Resolution::Defend(self.process_defend(instance, actor, now))
            }
            (CombatAction::Timeout, _) => {
                Resolution::Defend(self.defend_as(instance, actor, CombatAction::Timeout, now))
            }
            (CombatAction::Flee, _) => Resolution::Flee(self.process_flee(instance, actor, now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Combatant;
    use crate::config::CombatConfig;
    use crate::instance::RoomId;
    use chrono::TimeZone;
    use fray_dice::ScriptedDice;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn engine(faces: &[u32]) -> Engine<ScriptedDice> {
        Engine::new(CombatConfig::default(), ScriptedDice::new(faces.to_vec()))
    }

    /// p1: STR +3, attack 7. n1: defense 5, 20 HP.
    fn duel() -> CombatInstance {
        let mut fight = CombatInstance::new(RoomId::new("hall"), t0());
        fight.add_player(
            Combatant::player("p1", "Ayla")
                .with_hp(20, 20)
                .with_stats(7, 4)
                .with_modifiers(3, 1, 0),
        );
        fight.add_enemy(Combatant::npc("n1", "Ghoul").with_hp(20, 20).with_stats(4, 5));
        fight
    }

    mod attack_tests {
        use super::*;

        #[test]
        fn str_three_roll_fifteen_hits_ac_fifteen() {
            let mut engine = engine(&[15]);
            let mut fight = duel();
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(outcome.hit);
            assert!(!outcome.critical);
            assert_eq!(outcome.to_hit, Some(18));
            assert_eq!(outcome.armor_class, Some(15));
            assert_eq!(outcome.damage, 5);
            assert_eq!(fight.get(&"n1".into()).unwrap().current_hp, 15);
        }

        #[test]
        fn natural_one_misses_regardless_of_modifiers() {
            let mut engine = engine(&[1]);
            let mut fight = duel();
            fight.get_mut(&"p1".into()).unwrap().str_mod = 50;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(outcome.is_miss());
            assert_eq!(outcome.damage, 0);
            assert!(outcome.message.contains("completely misses"));
            assert_eq!(fight.get(&"n1".into()).unwrap().current_hp, 20);
        }

        #[test]
        fn natural_twenty_hits_any_ac_and_doubles() {
            let mut engine = engine(&[20]);
            let mut fight = duel();
            fight.get_mut(&"n1".into()).unwrap().defense_bonus = 100;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(outcome.hit);
            assert!(outcome.critical);
            assert_eq!(outcome.damage, 10);
            assert!(outcome.message.starts_with("CRITICAL HIT!"));
        }

        #[test]
        fn defense_bonus_raises_ac() {
            let mut engine = engine(&[15]);
            let mut fight = duel();
            fight.get_mut(&"n1".into()).unwrap().defense_bonus = 4;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(!outcome.hit);
            assert_eq!(outcome.armor_class, Some(19));
        }

        #[test]
        fn heavy_armor_still_takes_one() {
            let mut engine = engine(&[20]);
            let mut fight = duel();
            fight.get_mut(&"n1".into()).unwrap().defense = 60;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert_eq!(outcome.damage, 2);
        }

        #[test]
        fn extreme_stats_saturate() {
            let mut engine = engine(&[20, 20]);
            let mut fight = duel();
            fight.get_mut(&"p1".into()).unwrap().attack_power = i32::MAX;
            fight.get_mut(&"n1".into()).unwrap().defense = i32::MIN;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(outcome.critical);
            assert_eq!(outcome.damage, i32::MAX);
            assert_eq!(outcome.armor_class, Some(i32::MIN + 10));
            assert!(outcome.target_died);

            let mut fight = duel();
            let p1 = fight.get_mut(&"p1".into()).unwrap();
            p1.attack_power = i32::MIN;
            p1.str_mod = i32::MAX;
            fight.get_mut(&"n1".into()).unwrap().defense = i32::MAX;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert_eq!(outcome.to_hit, Some(i32::MAX));
            assert_eq!(outcome.armor_class, Some(i32::MAX));
            assert_eq!(outcome.damage, 2);
        }

        #[test]
        fn lethal_hit_floors_hp_and_reports_death() {
            let mut engine = engine(&[18]);
            let mut fight = duel();
            fight.get_mut(&"n1".into()).unwrap().current_hp = 3;
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert!(outcome.target_died);
            assert!(outcome.message.ends_with("Ghoul has been defeated!"));
            let ghoul = fight.get(&"n1".into()).unwrap();
            assert_eq!(ghoul.current_hp, 0);
            assert!(!ghoul.is_alive());
        }

        #[test]
        fn invalid_participants_are_soft_misses() {
            let mut engine = engine(&[]);
            let mut fight = duel();
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"ghost".into(), t0());
            assert_eq!(outcome.message, "Invalid attacker or target");
            assert!(outcome.roll.is_none());

            fight.get_mut(&"n1".into()).unwrap().take_damage(100);
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert_eq!(outcome.message, "Target is already dead");

            fight.get_mut(&"p1".into()).unwrap().take_damage(100);
            let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            assert_eq!(outcome.message, "Attacker is dead");
            assert!(fight.log().is_empty());
        }

        #[test]
        fn attack_is_logged_with_target_and_damage() {
            let mut engine = engine(&[15]);
            let mut fight = duel();
            engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
            let entry = fight.log().last().unwrap();
            assert_eq!(entry.action, Some(CombatAction::Attack));
            assert_eq!(entry.outcome, Some(LogOutcome::Hit));
            assert_eq!(entry.target, Some("n1".into()));
            assert_eq!(entry.damage, 5);
        }
    }

    mod defend_tests {
        use super::*;

        #[test]
        fn bonus_is_half_defense_with_floor_of_two() {
            let engine = engine(&[]);
            assert_eq!(engine.defend_bonus(0), 2);
            assert_eq!(engine.defend_bonus(5), 2);
            assert_eq!(engine.defend_bonus(9), 4);
        }

        #[test]
        fn defend_sets_bonus_and_logs() {
            let mut engine = engine(&[]);
            let mut fight = duel();
            let outcome = engine.process_defend(&mut fight, &"n1".into(), t0());
            assert!(outcome.applied);
            assert_eq!(outcome.bonus, 2);
            assert_eq!(fight.get(&"n1".into()).unwrap().defense_bonus, 2);
            assert_eq!(fight.log().last().unwrap().outcome, Some(LogOutcome::Defended));
        }

        #[test]
        fn downed_defender_is_a_no_op() {
            let mut engine = engine(&[]);
            let mut fight = duel();
            fight.get_mut(&"p1".into()).unwrap().take_damage(100);
            let outcome = engine.process_defend(&mut fight, &"p1".into(), t0());
            assert!(!outcome.applied);
            assert_eq!(fight.get(&"p1".into()).unwrap().defense_bonus, 0);
        }

        #[test]
        fn timeout_is_logged_as_timeout() {
            let mut engine = engine(&[]);
            let mut fight = duel();
            let resolution = engine.resolve(&mut fight, &"p1".into(), CombatAction::Timeout, None, t0());
            assert!(matches!(resolution, Resolution::Defend(DefendOutcome { applied: true, .. })));
            assert_eq!(fight.log().last().unwrap().action, Some(CombatAction::Timeout));
        }
    }

    mod flee_tests {
        use super::*;

        #[test]
        fn chance_is_clamped() {
            let engine = engine(&[]);
            assert!((engine.flee_chance(0) - 0.50).abs() < 1e-9);
            assert!((engine.flee_chance(5) - 0.60).abs() < 1e-9);
            assert!((engine.flee_chance(-100) - 0.10).abs() < 1e-9);
            assert!((engine.flee_chance(100) - 0.95).abs() < 1e-9);
        }

        #[test]
        fn roll_at_chance_escapes() {
            let mut engine = engine(&[52]);
            let mut fight = duel();
            let outcome = engine.process_flee(&mut fight, &"p1".into(), t0());
            assert_eq!(outcome.chance_percent, 52);
            assert!(outcome.success);
            assert!(fight.get(&"p1".into()).unwrap().has_fled());
        }

        #[test]
        fn roll_over_chance_is_blocked() {
            let mut engine = engine(&[53]);
            let mut fight = duel();
            let outcome = engine.process_flee(&mut fight, &"p1".into(), t0());
            assert!(!outcome.success);
            assert!(fight.get(&"p1".into()).unwrap().can_act());
            assert_eq!(fight.log().last().unwrap().outcome, Some(LogOutcome::Blocked));
        }

        #[test]
        fn unknown_combatant_cannot_flee() {
            let mut engine = engine(&[]);
            let mut fight = duel();
            let outcome = engine.process_flee(&mut fight, &"ghost".into(), t0());
            assert!(!outcome.success);
            assert!(outcome.roll.is_none());
        }
    }
}
