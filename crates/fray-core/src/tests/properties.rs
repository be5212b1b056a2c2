//! Property checks of the combat rules.

use proptest::prelude::*;

use fray_dice::ScriptedDice;

use crate::combatant::Combatant;
use crate::config::CombatConfig;
use crate::engine::Engine;
use crate::instance::{CombatInstance, CombatState, RoomId};

use super::helpers::t0;

fn engine(faces: Vec<u32>) -> Engine<ScriptedDice> {
    Engine::new(CombatConfig::default(), ScriptedDice::new(faces))
}

fn duel(attack_power: i32, str_mod: i32, defense: i32) -> CombatInstance {
    let mut fight = CombatInstance::new(RoomId::new("yard"), t0());
    fight.add_player(
        Combatant::player("p1", "Ayla")
            .with_hp(100, 100)
            .with_stats(attack_power, 0)
            .with_modifiers(str_mod, 0, 0),
    );
    fight.add_enemy(
        Combatant::npc("n1", "Ghoul")
            .with_hp(10_000, 10_000)
            .with_stats(1, defense),
    );
    fight
}

/// A stat drawn from `range`, with the `i32` extremes mixed in.
fn stat(range: std::ops::Range<i32>) -> impl Strategy<Value = i32> {
    prop_oneof![Just(i32::MIN), Just(i32::MAX), range]
}

/// How a generated combatant ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Standing,
    Dead,
    Fled,
}

fn fate() -> impl Strategy<Value = Fate> {
    prop_oneof![Just(Fate::Standing), Just(Fate::Dead), Just(Fate::Fled)]
}

fn apply(c: &mut Combatant, fate: Fate) {
    match fate {
        Fate::Standing => {}
        Fate::Dead => {
            c.take_damage(c.current_hp);
        }
        Fate::Fled => c.mark_fled(),
    }
}

fn roster(players: &[Fate], enemies: &[Fate]) -> CombatInstance {
    let mut fight = CombatInstance::new(RoomId::new("yard"), t0());
    for (i, &f) in players.iter().enumerate() {
        let mut c = Combatant::player(format!("p{i}"), format!("P{i}")).with_hp(10, 10);
        apply(&mut c, f);
        fight.add_player(c);
    }
    for (i, &f) in enemies.iter().enumerate() {
        let mut c = Combatant::npc(format!("n{i}"), format!("N{i}")).with_hp(10, 10);
        apply(&mut c, f);
        fight.add_enemy(c);
    }
    fight
}

proptest! {
    #[test]
    fn landed_hit_deals_at_least_one(
        natural in 2u32..=19,
        attack_power in stat(-10..50),
        str_mod in -5i32..10,
        defense in stat(0..200),
    ) {
        let mut engine = engine(vec![natural]);
        let mut fight = duel(attack_power, str_mod, defense);
        let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
        if outcome.hit {
            prop_assert!(outcome.damage >= 1);
            prop_assert_eq!(outcome.damage, attack_power.saturating_sub(defense / 2).max(1));
        } else {
            prop_assert_eq!(outcome.damage, 0);
        }
    }

    #[test]
    fn natural_twenty_doubles_base_damage(
        attack_power in stat(-10..50),
        defense in stat(0..200),
    ) {
        let mut engine = engine(vec![20]);
        let mut fight = duel(attack_power, -5, defense);
        let outcome = engine.process_attack(&mut fight, &"p1".into(), &"n1".into(), t0());
        prop_assert!(outcome.critical);
        let base = attack_power.saturating_sub(defense / 2).max(1);
        prop_assert_eq!(outcome.damage, base.saturating_mul(2));
    }

    #[test]
    fn flee_chance_stays_in_bounds(dex_mod in -1_000i32..1_000) {
        let engine = engine(Vec::new());
        let chance = engine.flee_chance(dex_mod);
        prop_assert!((0.10..=0.95).contains(&chance));
    }

    #[test]
    fn each_pass_adds_exactly_one_round(size in 1usize..6, steps in 0usize..40) {
        let engine = engine(Vec::new());
        let mut fight = roster(&vec![Fate::Standing; size], &[Fate::Standing]);
        engine.build_turn_order(&mut fight);
        let total = size + 1;
        for _ in 0..steps {
            prop_assert!(engine.next_turn(&mut fight, t0()).is_some());
        }
        prop_assert_eq!(fight.round() as usize, 1 + steps / total);
        prop_assert_eq!(fight.current_turn_index(), steps % total);
    }

    #[test]
    fn next_turn_lands_on_someone_able_to_act(
        kills in proptest::collection::vec(0usize..6, 0..12),
    ) {
        let engine = engine(Vec::new());
        let mut fight = roster(&[Fate::Standing; 3], &[Fate::Standing; 3]);
        engine.build_turn_order(&mut fight);
        let everyone: Vec<_> = fight.combatants().map(|c| c.id.clone()).collect();
        for kill in kills {
            if let Some(c) = fight.get_mut(&everyone[kill]) {
                c.take_damage(c.current_hp);
            }
            match engine.next_turn(&mut fight, t0()) {
                Some(id) => {
                    let current = fight.current().cloned();
                    prop_assert_eq!(current.as_ref().map(|c| &c.id), Some(&id));
                    prop_assert!(current.is_some_and(|c| c.can_act()));
                }
                None => prop_assert!(fight.combatants().all(|c| !c.can_act())),
            }
        }
    }

    #[test]
    fn end_state_follows_the_rosters(
        players in proptest::collection::vec(fate(), 1..5),
        enemies in proptest::collection::vec(fate(), 1..5),
    ) {
        let engine = engine(Vec::new());
        let fight = roster(&players, &enemies);

        // A fled enemy is still alive, so only the dead count towards a win.
        let enemies_dead = enemies.iter().all(|&f| f == Fate::Dead);
        let players_out = players.iter().all(|&f| f != Fate::Standing);
        let expected = if enemies_dead {
            Some(CombatState::Victory)
        } else if players_out && players.contains(&Fate::Dead) {
            Some(CombatState::Defeat)
        } else if players_out {
            Some(CombatState::Fled)
        } else {
            None
        };

        prop_assert_eq!(engine.check_combat_end(&fight, t0()), expected);
    }
}
