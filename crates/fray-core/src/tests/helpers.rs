//! Fixtures for fights.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fray_dice::{Dice, ScriptedDice};

use crate::combatant::CombatantId;
use crate::config::CombatConfig;
use crate::controller::Controller;
use crate::directory::{Character, EnemyTrait, Npc};
use crate::engine::Engine;
use crate::manager::Manager;
use crate::memory::{InMemoryCharacters, InMemoryNpcs, RecordingSink};

/// Routes `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed start time for every fixture.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap()
}

/// `t0` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// A character with the given HP and STR score; every other score is 10.
pub fn hero(id: &str, user: &str, hp: i32, strength: i32, weapon: i32) -> Character {
    let mut character = Character::new(id, user, id.to_uppercase());
    character.current_hp = hp;
    character.max_hp = hp;
    character.strength = strength;
    character.weapon_damage = weapon;
    character
}

/// A level-one enemy NPC.
pub fn monster(id: &str, hp: i32, attack_power: i32, defense: i32) -> Npc {
    let mut npc = Npc::new(id, id.to_uppercase()).with_enemy(EnemyTrait {
        attack_power,
        defense,
        flee_threshold: 0.0,
    });
    npc.current_hp = hp;
    npc.max_hp = hp;
    npc
}

/// A controller wired to in-memory collaborators.
pub struct World<D: Dice = ScriptedDice> {
    pub controller: Controller<D>,
    pub characters: Arc<InMemoryCharacters>,
    pub npcs: Arc<InMemoryNpcs>,
    pub sink: Arc<RecordingSink>,
}

impl World<ScriptedDice> {
    /// Default rules, dice serving `faces` first.
    pub fn scripted(faces: &[u32]) -> Self {
        Self::with_dice(CombatConfig::default(), ScriptedDice::new(faces.to_vec()))
    }
}

impl<D: Dice> World<D> {
    /// Custom rules and dice.
    pub fn with_dice(config: CombatConfig, dice: D) -> Self {
        init_tracing();
        let characters = Arc::new(InMemoryCharacters::new());
        let npcs = Arc::new(InMemoryNpcs::new());
        let sink = Arc::new(RecordingSink::new());
        let controller = Controller::new(
            Manager::new(),
            Engine::new(config, dice),
            characters.clone(),
            npcs.clone(),
            sink.clone(),
        );
        Self {
            controller,
            characters,
            npcs,
            sink,
        }
    }

    /// Stores characters and NPCs in the directories.
    pub fn populate(&self, characters: &[Character], npcs: &[Npc]) {
        for character in characters {
            self.characters.insert(character.clone());
        }
        for npc in npcs {
            self.npcs.insert(npc.clone());
        }
    }

    /// Current HP of a combatant in its fight.
    pub fn hp(&self, id: &str) -> Option<i32> {
        let id = CombatantId::new(id);
        let manager = self.controller.manager();
        manager
            .get_instance_by_player_id(&id)
            .or_else(|| manager.get_instance_by_npc_id(&id))
            .and_then(|fight| fight.get(&id).map(|c| c.current_hp))
    }
}

/// Shorthand for a list of combatant ids.
pub fn ids(raw: &[&str]) -> Vec<CombatantId> {
    raw.iter().map(|id| CombatantId::new(*id)).collect()
}
