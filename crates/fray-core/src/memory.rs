//! In-memory collaborators for tests and local runs.

use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, RwLock};

use crate::combatant::{CombatantId, UserId};
use crate::directory::{
    Character, CharacterDirectory, CombatMessage, NotificationSink, Npc, NpcDirectory,
};
use crate::error::{DeliveryError, DirectoryError};

/// Characters kept in a map.
#[derive(Debug, Default)]
pub struct InMemoryCharacters {
    characters: RwLock<HashMap<CombatantId, Character>>,
    failing: RwLock<HashSet<CombatantId>>,
}

impl InMemoryCharacters {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a character.
    pub fn insert(&self, character: Character) {
        self.characters
            .write()
            .insert(character.id.clone(), character);
    }

    /// Current stored copy of a character.
    #[must_use]
    pub fn get(&self, id: &CombatantId) -> Option<Character> {
        self.characters.read().get(id).cloned()
    }

    /// Makes every later `update` of `id` fail with a backend error.
    pub fn fail_updates_for(&self, id: CombatantId) {
        self.failing.write().insert(id);
    }
}

impl CharacterDirectory for InMemoryCharacters {
    fn find_by_id(&self, id: &CombatantId) -> Result<Character, DirectoryError> {
        self.get(id).ok_or_else(|| DirectoryError::NotFound(id.clone()))
    }

    fn update(&self, character: &Character) -> Result<(), DirectoryError> {
        if self.failing.read().contains(&character.id) {
            return Err(DirectoryError::Backend(format!(
                "write rejected for {}",
                character.id
            )));
        }
        let mut characters = self.characters.write();
        let stored = characters
            .get_mut(&character.id)
            .ok_or_else(|| DirectoryError::NotFound(character.id.clone()))?;
        stored.clone_from(character);
        Ok(())
    }
}

/// NPCs kept in a map.
#[derive(Debug, Default)]
pub struct InMemoryNpcs {
    npcs: RwLock<HashMap<CombatantId, Npc>>,
}

impl InMemoryNpcs {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an NPC.
    pub fn insert(&self, npc: Npc) {
        self.npcs.write().insert(npc.id.clone(), npc);
    }

    /// Current stored copy of an NPC.
    #[must_use]
    pub fn get(&self, id: &CombatantId) -> Option<Npc> {
        self.npcs.read().get(id).cloned()
    }
}

impl NpcDirectory for InMemoryNpcs {
    fn find_by_id(&self, id: &CombatantId) -> Result<Npc, DirectoryError> {
        self.get(id).ok_or_else(|| DirectoryError::NotFound(id.clone()))
    }

    fn update_instance(&self, id: &CombatantId, f: &mut dyn FnMut(&mut Npc)) -> bool {
        match self.npcs.write().get_mut(id) {
            Some(npc) => {
                f(npc);
                true
            }
            None => false,
        }
    }
}

/// Sink that records every delivered message.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(UserId, CombatMessage)>>,
    offline: RwLock<HashSet<UserId>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects further deliveries to `user`.
    pub fn disconnect(&self, user: UserId) {
        self.offline.write().insert(user);
    }

    /// Every delivered message in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(UserId, CombatMessage)> {
        self.sent.lock().clone()
    }

    /// Messages delivered to one user.
    #[must_use]
    pub fn messages_for(&self, user: &UserId) -> Vec<CombatMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == user)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Forgets every recorded message.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn send_to_user(&self, user: &UserId, message: &CombatMessage) -> Result<(), DeliveryError> {
        if self.offline.read().contains(user) {
            return Err(DeliveryError::NotConnected(user.to_string()));
        }
        self.sent.lock().push((user.clone(), message.clone()));
        Ok(())
    }
}
