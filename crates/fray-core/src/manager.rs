//! Registry of live fights.
//!
//! The [`Manager`] stores every live [`CombatInstance`] together with two
//! indexes, character id → instance and NPC id → instance. One
//! `parking_lot::RwLock` guards all three maps, so removing an instance and
//! every index entry pointing at it is a single atomic step.
//!
//! # Single driver
//!
//! Mutation never happens behind the lock. A caller takes an exclusive
//! [`CombatSession`] with [`Manager::checkout`], works on the instance without
//! holding any lock, and the session puts the instance back when dropped.
//! While a session is out, further checkouts of the same instance return
//! `None` and readers see the last checked-in snapshot.
//!
//! ```
//! use chrono::Utc;
//! use fray_core::instance::RoomId;
//! use fray_core::manager::Manager;
//!
//! let manager = Manager::new();
//! let id = manager.create_instance(RoomId::new("crypt"), Utc::now());
//!
//! {
//!     let mut session = manager.checkout(id).unwrap();
//!     assert!(manager.checkout(id).is_none());
//!     session.set_turn_timeout_secs(90);
//! }
//!
//! assert_eq!(manager.get_instance(id).unwrap().turn_timeout_secs(), 90);
//! ```

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::combatant::CombatantId;
use crate::instance::{CombatInstance, CombatState, InstanceId, RoomId};

#[derive(Debug)]
struct Entry {
    /// Last checked-in state.
    instance: CombatInstance,
    checked_out: bool,
}

#[derive(Debug, Default)]
struct Registry {
    instances: HashMap<InstanceId, Entry>,
    players: HashMap<CombatantId, InstanceId>,
    npcs: HashMap<CombatantId, InstanceId>,
}

/// Shared handle to the fight registry. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    inner: Arc<RwLock<Registry>>,
}

impl Manager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates and stores a pending fight in `room`.
    pub fn create_instance(&self, room: RoomId, now: DateTime<Utc>) -> InstanceId {
        self.insert_instance(CombatInstance::new(room, now))
    }

    /// Stores an already built instance and returns its id.
    ///
    /// An instance with the same id is replaced.
    pub fn insert_instance(&self, instance: CombatInstance) -> InstanceId {
        let id = instance.id();
        info!(instance_id = %id, room_id = %instance.origin_room(), "combat instance created");
        self.inner.write().instances.insert(
            id,
            Entry {
                instance,
                checked_out: false,
            },
        );
        id
    }

    /// Removes a fight and every index entry pointing at it.
    ///
    /// Returns the last checked-in snapshot, or `None` if the id is unknown.
    /// A session still out for the instance is discarded when it drops.
    pub fn remove_instance(&self, id: InstanceId) -> Option<CombatInstance> {
        let mut registry = self.inner.write();
        let entry = registry.instances.remove(&id)?;
        registry.players.retain(|_, instance| *instance != id);
        registry.npcs.retain(|_, instance| *instance != id);
        drop(registry);
        info!(instance_id = %id, state = %entry.instance.state(), "combat instance removed");
        Some(entry.instance)
    }

    /// Takes exclusive ownership of a fight until the session drops.
    ///
    /// Returns `None` if the id is unknown or another session is out.
    #[must_use]
    pub fn checkout(&self, id: InstanceId) -> Option<CombatSession> {
        let mut registry = self.inner.write();
        let entry = registry.instances.get_mut(&id)?;
        if entry.checked_out {
            debug!(instance_id = %id, "combat instance busy");
            return None;
        }
        entry.checked_out = true;
        let instance = entry.instance.clone();
        drop(registry);
        Some(CombatSession {
            instance,
            registry: Arc::clone(&self.inner),
        })
    }

    /// True while a session for `id` is out.
    #[must_use]
    pub fn is_checked_out(&self, id: InstanceId) -> bool {
        self.inner
            .read()
            .instances
            .get(&id)
            .is_some_and(|entry| entry.checked_out)
    }

    /// Runs `f` on the instance inside a short-lived session.
    ///
    /// Returns false if the id is unknown or the instance is checked out.
    pub fn update_instance(&self, id: InstanceId, f: impl FnOnce(&mut CombatInstance)) -> bool {
        match self.checkout(id) {
            Some(mut session) => {
                f(&mut *session);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of a fight.
    #[must_use]
    pub fn get_instance(&self, id: InstanceId) -> Option<CombatInstance> {
        self.inner
            .read()
            .instances
            .get(&id)
            .map(|entry| entry.instance.clone())
    }

    /// Snapshot of the fight a character is registered in.
    #[must_use]
    pub fn get_instance_by_player_id(&self, player: &CombatantId) -> Option<CombatInstance> {
        let registry = self.inner.read();
        let id = registry.players.get(player)?;
        registry.instances.get(id).map(|entry| entry.instance.clone())
    }

    /// Snapshot of the fight an NPC is registered in.
    #[must_use]
    pub fn get_instance_by_npc_id(&self, npc: &CombatantId) -> Option<CombatInstance> {
        let registry = self.inner.read();
        let id = registry.npcs.get(npc)?;
        registry.instances.get(id).map(|entry| entry.instance.clone())
    }

    /// Id of the fight a character is registered in.
    #[must_use]
    pub fn instance_id_for_player(&self, player: &CombatantId) -> Option<InstanceId> {
        self.inner.read().players.get(player).copied()
    }

    /// Id of the fight an NPC is registered in.
    #[must_use]
    pub fn instance_id_for_npc(&self, npc: &CombatantId) -> Option<InstanceId> {
        self.inner.read().npcs.get(npc).copied()
    }

    /// True while a character is registered in a fight.
    #[must_use]
    pub fn is_player_in_combat(&self, player: &CombatantId) -> bool {
        self.inner.read().players.contains_key(player)
    }

    /// True while an NPC is registered in a fight.
    #[must_use]
    pub fn is_npc_in_combat(&self, npc: &CombatantId) -> bool {
        self.inner.read().npcs.contains_key(npc)
    }

    /// Snapshots of every fight in the `Active` state.
    #[must_use]
    pub fn get_active_instances(&self) -> Vec<CombatInstance> {
        self.collect(|instance| instance.state() == CombatState::Active)
    }

    /// Snapshots of every stored fight.
    #[must_use]
    pub fn get_all_instances(&self) -> Vec<CombatInstance> {
        self.collect(|_| true)
    }

    /// Snapshots of every fight started in `room`.
    #[must_use]
    pub fn get_instances_in_room(&self, room: &RoomId) -> Vec<CombatInstance> {
        self.collect(|instance| instance.origin_room() == room)
    }

    /// Ids of every fight in the `Active` state.
    #[must_use]
    pub fn active_instance_ids(&self) -> Vec<InstanceId> {
        self.inner
            .read()
            .instances
            .iter()
            .filter(|(_, entry)| entry.instance.state() == CombatState::Active)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of stored fights.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.read().instances.len()
    }

    fn collect(&self, keep: impl Fn(&CombatInstance) -> bool) -> Vec<CombatInstance> {
        self.inner
            .read()
            .instances
            .values()
            .filter(|entry| keep(&entry.instance))
            .map(|entry| entry.instance.clone())
            .collect()
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Records that a character fights in `instance`.
    ///
    /// Returns false, and records nothing, if the instance is unknown.
    pub fn register_player(&self, player: CombatantId, instance: InstanceId) -> bool {
        let mut registry = self.inner.write();
        if !registry.instances.contains_key(&instance) {
            return false;
        }
        registry.players.insert(player, instance);
        true
    }

    /// Records that an NPC fights in `instance`.
    ///
    /// Returns false, and records nothing, if the instance is unknown.
    pub fn register_npc(&self, npc: CombatantId, instance: InstanceId) -> bool {
        let mut registry = self.inner.write();
        if !registry.instances.contains_key(&instance) {
            return false;
        }
        registry.npcs.insert(npc, instance);
        true
    }

    /// Drops a character's index entry.
    pub fn unregister_player(&self, player: &CombatantId) {
        self.inner.write().players.remove(player);
    }

    /// Drops an NPC's index entry.
    pub fn unregister_npc(&self, npc: &CombatantId) {
        self.inner.write().npcs.remove(npc);
    }
}

// =============================================================================
// Combat Session
// =============================================================================

/// Exclusive, owned access to one fight.
///
/// Dereferences to the [`CombatInstance`]. Dropping the session stores the
/// instance back in the [`Manager`]; if the fight was removed in the
/// meantime the session's state is discarded.
#[derive(Debug)]
pub struct CombatSession {
    instance: CombatInstance,
    registry: Arc<RwLock<Registry>>,
}

impl Deref for CombatSession {
    type Target = CombatInstance;

    fn deref(&self) -> &CombatInstance {
        &self.instance
    }
}

impl DerefMut for CombatSession {
    fn deref_mut(&mut self) -> &mut CombatInstance {
        &mut self.instance
    }
}

impl Drop for CombatSession {
    fn drop(&mut self) {
        let mut registry = self.registry.write();
        if let Some(entry) = registry.instances.get_mut(&self.instance.id()) {
            std::mem::swap(&mut entry.instance, &mut self.instance);
            entry.checked_out = false;
        }
    }
}
