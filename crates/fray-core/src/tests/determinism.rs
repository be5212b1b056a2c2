//! Same seed, same fight.

use fray_dice::SeededDice;

use crate::combatant::CombatantId;
use crate::config::CombatConfig;
use crate::instance::{CombatState, RoomId};

use super::helpers::{at, hero, ids, monster, t0, World};

/// Plays a duel to the end by attacking every turn. Returns every report
/// message and the final state.
fn duel(seed: u64) -> (Vec<String>, Option<CombatState>) {
    let world = World::with_dice(CombatConfig::default(), SeededDice::new(seed));
    world.populate(
        &[hero("c1", "u1", 30, 14, 3), hero("c2", "u2", 24, 12, 2)],
        &[monster("n1", 25, 4, 2), monster("n2", 15, 3, 1)],
    );
    let controller = &world.controller;
    controller
        .engage(RoomId::new("arena"), &ids(&["c1", "c2"]), &ids(&["n1", "n2"]), t0())
        .unwrap();

    let party = ids(&["c1", "c2"]);
    let mut messages = Vec::new();
    for step in 1..=200 {
        let acting: Option<CombatantId> = party
            .iter()
            .find(|id| {
                controller
                    .status(id, at(step))
                    .is_some_and(|summary| summary.your_turn)
            })
            .cloned();
        let Some(player) = acting else {
            break;
        };
        let report = controller.attack(&player, None, at(step));
        messages.push(report.message);
        if report.ended.is_some() {
            return (messages, report.ended);
        }
    }
    (messages, None)
}

#[test]
fn same_seed_replays_the_same_fight() {
    let (first, first_end) = duel(42);
    let (second, second_end) = duel(42);
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first_end, second_end);
}

#[test]
fn seeded_fights_reach_an_end() {
    for seed in [1, 7, 99] {
        let (messages, ended) = duel(seed);
        assert!(ended.is_some(), "seed {seed} never ended after {} actions", messages.len());
    }
}
