//! Orchestration of whole fights.
//!
//! The [`Controller`] ties the [`Manager`], the [`Engine`] and the outside
//! world together. Player commands go through it; after every player action
//! it advances the turn, checks whether the fight is over and, if not, plays
//! NPC turns (and turns the players pre-selected) until a player has to act.
//!
//! Time never advances by itself. The embedding game loop calls
//! [`Controller::tick`] with the current time to expire idle turns and fights
//! that ran past the duration ceiling.
//!
//! Each command checks the fight out of the manager for its whole duration,
//! so only one caller at a time drives a given fight. Directory and
//! notification failures are logged and never abort a fight.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fray_dice::{Dice, SeededDice};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::combatant::{CombatAction, Combatant, CombatantId, QueuedAction};
use crate::config::CombatConfig;
use crate::directory::{
    CharacterDirectory, CombatMessage, MessageKind, NotificationSink, NpcDirectory, NpcState,
};
use crate::engine::{Engine, FleeOutcome, Resolution};
use crate::error::EngageError;
use crate::instance::{CombatInstance, CombatLogEntry, CombatState, InstanceId, LogOutcome, RoomId};
use crate::manager::{CombatSession, Manager};
use crate::status::CombatSummary;

const NOT_IN_COMBAT: &str = "You are not in combat.";
const BUSY: &str = "The fight is being resolved, try again.";

/// How a player command was handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    /// The action was carried out.
    Resolved,
    /// It was not the player's turn; the action will run when it is.
    Queued,
    /// Nothing happened.
    Rejected,
}

/// Reply to a player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    /// How the command was handled.
    pub status: ActionStatus,
    /// Text for the acting player.
    pub message: String,
    /// Terminal state when the command ended the fight.
    pub ended: Option<CombatState>,
}

impl ActionReport {
    fn resolved(message: impl Into<String>, ended: Option<CombatState>) -> Self {
        Self {
            status: ActionStatus::Resolved,
            message: message.into(),
            ended,
        }
    }

    fn queued(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Queued,
            message: message.into(),
            ended: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Rejected,
            message: message.into(),
            ended: None,
        }
    }
}

/// Runs fights end to end.
pub struct Controller<D: Dice = SeededDice> {
    manager: Manager,
    engine: Mutex<Engine<D>>,
    config: CombatConfig,
    characters: Arc<dyn CharacterDirectory>,
    npcs: Arc<dyn NpcDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl<D: Dice> Controller<D> {
    /// Wires a controller to its registry, rules and collaborators.
    pub fn new(
        manager: Manager,
        engine: Engine<D>,
        characters: Arc<dyn CharacterDirectory>,
        npcs: Arc<dyn NpcDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let config = engine.config().clone();
        Self {
            manager,
            engine: Mutex::new(engine),
            config,
            characters,
            npcs,
            sink,
        }
    }

    /// The fight registry.
    #[must_use]
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Locks the engine, e.g. to queue scripted dice.
    pub fn engine(&self) -> MutexGuard<'_, Engine<D>> {
        self.engine.lock()
    }

    /// True while the character is registered in a fight.
    #[must_use]
    pub fn is_player_in_combat(&self, player: &CombatantId) -> bool {
        self.manager.is_player_in_combat(player)
    }

    /// True while the NPC is registered in a fight.
    #[must_use]
    pub fn is_npc_in_combat(&self, npc: &CombatantId) -> bool {
        self.manager.is_npc_in_combat(npc)
    }

    // =========================================================================
    // Starting a fight
    // =========================================================================

    /// Starts a fight between `players` and `npcs` in `room`.
    ///
    /// Everyone is flagged as fighting in their directory and the players
    /// are told the fight began. If an NPC won initiative, NPC turns are
    /// played until a player has to act.
    ///
    /// # Errors
    ///
    /// Returns [`EngageError`] if a side is empty, an id is named twice, a
    /// participant is already fighting, an NPC cannot be fought, or a
    /// directory lookup fails.
    pub fn engage(
        &self,
        room: RoomId,
        players: &[CombatantId],
        npcs: &[CombatantId],
        now: DateTime<Utc>,
    ) -> Result<InstanceId, EngageError> {
        if players.is_empty() {
            return Err(EngageError::NoPlayers);
        }
        if npcs.is_empty() {
            return Err(EngageError::NoEnemies);
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = players.iter().chain(npcs).find(|id| !seen.insert(*id)) {
            return Err(EngageError::Duplicate(dup.clone()));
        }

        let mut characters = Vec::with_capacity(players.len());
        for id in players {
            let character = self.characters.find_by_id(id)?;
            if character.in_combat || self.manager.is_player_in_combat(id) {
                return Err(EngageError::PlayerBusy(id.clone()));
            }
            characters.push(character);
        }
        let mut enemies = Vec::with_capacity(npcs.len());
        for id in npcs {
            let npc = self.npcs.find_by_id(id)?;
            if !npc.is_enemy() {
                return Err(EngageError::NotAnEnemy(id.clone()));
            }
            if npc.state == NpcState::Dead || npc.current_hp <= 0 {
                return Err(EngageError::AlreadyDead(id.clone()));
            }
            if npc.in_combat || self.manager.is_npc_in_combat(id) {
                return Err(EngageError::NpcBusy(id.clone()));
            }
            enemies.push(npc);
        }

        let id = self
            .engine
            .lock()
            .initiate_combat(&self.manager, room, &characters, &enemies, now);

        for mut character in characters {
            character.in_combat = true;
            character.combat_instance_id = Some(id);
            if let Err(err) = self.characters.update(&character) {
                warn!(instance_id = %id, character_id = %character.id, error = %err, "failed to flag character in combat");
            }
        }
        for npc in &enemies {
            let flagged = self.npcs.update_instance(&npc.id, &mut |n| {
                n.in_combat = true;
                n.combat_instance_id = Some(id);
                n.state = NpcState::Combat;
            });
            if !flagged {
                warn!(instance_id = %id, npc_id = %npc.id, "failed to flag npc in combat");
            }
        }

        let Some(mut session) = self.manager.checkout(id) else {
            return Ok(id);
        };
        let order: Vec<String> = session
            .turn_order()
            .map(|c| format!("{} ({})", c.name, c.initiative))
            .collect();
        let opening = format!("Combat begins! Turn order: {}", order.join(", "));
        self.broadcast(&session, MessageKind::Started, &opening, None);

        if let Some(state) = self.run_turns(&mut session, now) {
            self.finalize_session(session, state, now);
        }
        Ok(id)
    }

    // =========================================================================
    // Player commands
    // =========================================================================

    /// Attacks `target`, or the auto-attack target, or the first enemy still
    /// fighting. Naming a target also makes it the auto-attack target.
    pub fn attack(
        &self,
        player: &CombatantId,
        target: Option<&CombatantId>,
        now: DateTime<Utc>,
    ) -> ActionReport {
        self.act(player, CombatAction::Attack, target, now)
    }

    /// Takes a defensive stance until the player's next turn.
    pub fn defend(&self, player: &CombatantId, now: DateTime<Utc>) -> ActionReport {
        self.act(player, CombatAction::Defend, None, now)
    }

    /// Tries to escape the fight.
    pub fn flee(&self, player: &CombatantId, now: DateTime<Utc>) -> ActionReport {
        self.act(player, CombatAction::Flee, None, now)
    }

    /// Chooses the action to take when the player's turn comes.
    pub fn queue_action(
        &self,
        player: &CombatantId,
        action: CombatAction,
        target: Option<&CombatantId>,
    ) -> ActionReport {
        let mut session = match self.player_session(player) {
            Ok(session) => session,
            Err(report) => return report,
        };
        if action == CombatAction::Timeout {
            return ActionReport::rejected("That is not something you can choose to do.");
        }
        if let Some(target) = target {
            if fighting_enemy(&session, target).is_none() {
                return ActionReport::rejected("You don't see that enemy here.");
            }
        }
        let Some(me) = session.get_mut(player) else {
            return ActionReport::rejected(NOT_IN_COMBAT);
        };
        me.queued = Some(QueuedAction {
            action,
            target: target.cloned(),
        });
        ActionReport::queued(format!("You will {action} when your turn comes."))
    }

    /// Sets the enemy attacked when an attack names no target.
    pub fn set_auto_attack_target(&self, player: &CombatantId, target: &CombatantId) -> ActionReport {
        let mut session = match self.player_session(player) {
            Ok(session) => session,
            Err(report) => return report,
        };
        let Some(name) = fighting_enemy(&session, target).map(|c| c.name.clone()) else {
            return ActionReport::rejected("You don't see that enemy here.");
        };
        let Some(me) = session.get_mut(player) else {
            return ActionReport::rejected(NOT_IN_COMBAT);
        };
        me.auto_attack_target = Some(target.clone());
        ActionReport::resolved(format!("You focus your attacks on {name}."), None)
    }

    /// Status summary of the player's fight.
    #[must_use]
    pub fn status(&self, player: &CombatantId, now: DateTime<Utc>) -> Option<CombatSummary> {
        let instance = self.manager.get_instance_by_player_id(player)?;
        Some(CombatSummary::new(&instance, player, now))
    }

    /// Pulls a player out of the fight, e.g. on disconnect.
    ///
    /// The player counts as fled without a roll, their character is written
    /// back at once, and the fight goes on (or ends) without them.
    pub fn leave_combat(&self, player: &CombatantId, now: DateTime<Utc>) -> ActionReport {
        let Some(id) = self.manager.instance_id_for_player(player) else {
            return ActionReport::rejected(NOT_IN_COMBAT);
        };
        let Some(mut session) = self.manager.checkout(id) else {
            return ActionReport::rejected(BUSY);
        };
        let Some(me) = session.player(player).cloned() else {
            self.manager.unregister_player(player);
            return ActionReport::rejected(NOT_IN_COMBAT);
        };

        let was_turn = session.current().is_some_and(|c| c.id == me.id);
        if me.can_act() {
            if let Some(c) = session.get_mut(player) {
                c.mark_fled();
                c.queued = None;
            }
            let message = format!("{} leaves the fight.", me.name);
            let entry = CombatLogEntry::action(&me, CombatAction::Flee, LogOutcome::Fled, message.clone());
            session.add_log(entry, now);
            self.broadcast(&session, MessageKind::Action, &message, Some(player));
        }
        self.release_player(&session, player);
        info!(instance_id = %id, character_id = %player, "player left combat");

        let ended = if session.state() != CombatState::Active {
            None
        } else if was_turn {
            self.advance(&mut session, now)
        } else {
            self.engine.lock().check_combat_end(&session, now)
        };
        if let Some(state) = ended {
            self.finalize_session(session, state, now);
        }
        ActionReport::resolved("You leave the fight.", ended)
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Expires idle turns and overlong fights.
    ///
    /// For every active fight not currently being driven: a fight past the
    /// duration ceiling ends in `Timeout`; a player whose turn ran out
    /// defends automatically (or flees after too many missed turns); NPC
    /// turns left over from an earlier cycle are played. Returns the fights
    /// that ended.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<(InstanceId, CombatState)> {
        let mut ended = Vec::new();
        for id in self.manager.active_instance_ids() {
            let Some(mut session) = self.manager.checkout(id) else {
                continue;
            };
            if session.state() != CombatState::Active {
                continue;
            }
            let current = session.current().cloned();
            let outcome = if now - session.created_at() >= self.config.combat_timeout() {
                Some(CombatState::Timeout)
            } else {
                match current {
                    Some(current) if current.is_player() && current.queued.is_none() => {
                        if session.is_turn_timed_out(now) {
                            self.expire_turn(&mut session, &current, now)
                        } else {
                            None
                        }
                    }
                    _ => self.run_turns(&mut session, now),
                }
            };
            if let Some(state) = outcome {
                self.finalize_session(session, state, now);
                ended.push((id, state));
            }
        }
        ended
    }

    /// Ends a fight, writes results back and removes it from the registry.
    ///
    /// Returns false when the fight is gone or another caller is driving it.
    pub fn finalize(&self, id: InstanceId, state: CombatState, now: DateTime<Utc>) -> bool {
        match self.manager.checkout(id) {
            Some(session) => {
                self.finalize_session(session, state, now);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Turn cycle
    // =========================================================================

    fn act(
        &self,
        player: &CombatantId,
        action: CombatAction,
        target: Option<&CombatantId>,
        now: DateTime<Utc>,
    ) -> ActionReport {
        let mut session = match self.player_session(player) {
            Ok(session) => session,
            Err(report) => return report,
        };

        let mut chosen = None;
        if action == CombatAction::Attack {
            if let Some(target) = target {
                if fighting_enemy(&session, target).is_none() {
                    return ActionReport::rejected("You don't see that enemy here.");
                }
                if let Some(me) = session.get_mut(player) {
                    me.auto_attack_target = Some(target.clone());
                }
            }
            chosen = attack_target(&session, player, target);
            if chosen.is_none() {
                return ActionReport::rejected("No enemy is left to fight. Flee or leave the fight.");
            }
        }

        let my_turn = session.current().is_some_and(|c| &c.id == player);
        let Some(me) = session.get_mut(player) else {
            return ActionReport::rejected(NOT_IN_COMBAT);
        };
        if !my_turn {
            me.queued = Some(QueuedAction {
                action,
                target: target.cloned(),
            });
            return ActionReport::queued(format!("You will {action} when your turn comes."));
        }
        me.missed_turns = 0;
        me.queued = None;

        let resolution = self
            .engine
            .lock()
            .resolve(&mut session, player, action, chosen.as_ref(), now);
        let message = resolution.message().to_string();
        self.broadcast(&session, MessageKind::Action, &message, Some(player));
        if escaped(&resolution) {
            self.release_player(&session, player);
        }

        let ended = self.advance(&mut session, now);
        if let Some(state) = ended {
            self.finalize_session(session, state, now);
        }
        ActionReport::resolved(message, ended)
    }

    /// Ends the current turn and plays on.
    fn advance(&self, session: &mut CombatSession, now: DateTime<Utc>) -> Option<CombatState> {
        self.engine.lock().next_turn(session, now);
        self.run_turns(session, now)
    }

    /// Plays turns from the current one until a player must act or the
    /// fight ends.
    fn run_turns(&self, session: &mut CombatSession, now: DateTime<Utc>) -> Option<CombatState> {
        let mut taken = 0;
        loop {
            let ended = self.engine.lock().check_combat_end(session, now);
            if ended.is_some() {
                return ended;
            }
            let Some(current) = session.current().cloned() else {
                let next = self.engine.lock().next_turn(session, now);
                if next.is_none() {
                    return Some(self.exhausted_state(session, now));
                }
                continue;
            };
            if !current.can_act() {
                self.engine.lock().next_turn(session, now);
                continue;
            }
            if current.is_player() && current.queued.is_none() {
                self.prompt(session, &current, now);
                return None;
            }
            if taken == self.config.max_npc_turns {
                warn!(instance_id = %session.id(), turns = taken, "turn limit reached, resuming on next tick");
                return None;
            }
            taken += 1;
            if current.is_player() {
                self.take_queued_turn(session, &current, now);
            } else {
                self.take_npc_turn(session, &current, now);
            }
            self.engine.lock().next_turn(session, now);
        }
    }

    /// Terminal state of a fight in which nobody can take a turn.
    fn exhausted_state(&self, session: &CombatInstance, now: DateTime<Utc>) -> CombatState {
        if let Some(state) = self.engine.lock().check_combat_end(session, now) {
            return state;
        }
        warn!(instance_id = %session.id(), "turn order exhausted with no end condition met");
        CombatState::Timeout
    }

    fn take_npc_turn(&self, session: &mut CombatSession, npc: &Combatant, now: DateTime<Utc>) {
        let entity = match self.npcs.find_by_id(&npc.id) {
            Ok(entity) => Some(entity),
            Err(err) => {
                debug!(npc_id = %npc.id, error = %err, "npc lookup failed, using defaults");
                None
            }
        };
        let resolution = {
            let mut engine = self.engine.lock();
            let (action, target) = engine.npc_action(session, &npc.id, entity.as_ref());
            engine.resolve(session, &npc.id, action, target.as_ref(), now)
        };
        self.broadcast(session, MessageKind::Action, resolution.message(), None);
    }

    fn take_queued_turn(&self, session: &mut CombatSession, player: &Combatant, now: DateTime<Utc>) {
        let Some(me) = session.get_mut(&player.id) else {
            return;
        };
        let Some(queued) = me.queued.take() else {
            return;
        };
        me.missed_turns = 0;
        let target = match queued.action {
            CombatAction::Attack => attack_target(session, &player.id, queued.target.as_ref()),
            _ => None,
        };
        let resolution = self
            .engine
            .lock()
            .resolve(session, &player.id, queued.action, target.as_ref(), now);
        self.broadcast(session, MessageKind::Action, resolution.message(), None);
        if escaped(&resolution) {
            self.release_player(session, &player.id);
        }
    }

    /// Handles a player turn that ran out on the clock.
    fn expire_turn(
        &self,
        session: &mut CombatSession,
        player: &Combatant,
        now: DateTime<Utc>,
    ) -> Option<CombatState> {
        let missed = {
            let me = session.get_mut(&player.id)?;
            me.missed_turns += 1;
            me.missed_turns
        };
        let action = if missed >= self.config.afk_auto_flee_after_turns {
            CombatAction::Flee
        } else {
            CombatAction::Timeout
        };
        debug!(instance_id = %session.id(), character_id = %player.id, missed, action = %action, "turn timed out");

        let resolution = self.engine.lock().resolve(session, &player.id, action, None, now);
        self.broadcast(session, MessageKind::Action, resolution.message(), None);
        if escaped(&resolution) {
            self.release_player(session, &player.id);
        }
        self.advance(session, now)
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    fn finalize_session(&self, mut session: CombatSession, state: CombatState, now: DateTime<Utc>) {
        let id = session.id();
        self.engine.lock().end_combat(&mut session, state, now);
        let mut message = CombatMessage::new(id, MessageKind::Ended, end_message(state));
        message.state = Some(state);
        self.send_to_players(&session, &message, None);

        let players: Vec<Combatant> = session.players().filter(|c| !c.has_fled()).cloned().collect();
        let enemies: Vec<Combatant> = session.enemies().cloned().collect();
        drop(session);

        for player in &players {
            self.sync_character(player);
        }
        for npc in &enemies {
            let synced = self.npcs.update_instance(&npc.id, &mut |n| {
                n.current_hp = npc.current_hp;
                n.in_combat = false;
                n.combat_instance_id = None;
                n.state = if npc.is_alive() {
                    NpcState::Idle
                } else {
                    NpcState::Dead
                };
            });
            if !synced {
                warn!(instance_id = %id, npc_id = %npc.id, "npc gone, result not written back");
            }
        }

        self.manager.remove_instance(id);
        info!(instance_id = %id, state = %state, "combat instance cleaned up");
    }

    /// Writes a departing player back and drops them from the index.
    fn release_player(&self, session: &CombatInstance, player: &CombatantId) {
        if let Some(c) = session.player(player) {
            self.sync_character(c);
        }
        self.manager.unregister_player(player);
    }

    fn sync_character(&self, combatant: &Combatant) {
        let result = self.characters.find_by_id(&combatant.id).and_then(|mut character| {
            character.current_hp = combatant.current_hp;
            character.in_combat = false;
            character.combat_instance_id = None;
            self.characters.update(&character)
        });
        if let Err(err) = result {
            warn!(character_id = %combatant.id, error = %err, "failed to write back character");
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    fn prompt(&self, session: &CombatInstance, player: &Combatant, now: DateTime<Utc>) {
        let Some(owner) = &player.owner else {
            return;
        };
        let text = format!(
            "It's your turn! You have {}s to act.",
            session.turn_time_remaining(now)
        );
        let message = CombatMessage::new(session.id(), MessageKind::YourTurn, text);
        if let Err(err) = self.sink.send_to_user(owner, &message) {
            debug!(user_id = %owner, error = %err, "notification dropped");
        }
    }

    fn broadcast(
        &self,
        session: &CombatInstance,
        kind: MessageKind,
        text: &str,
        except: Option<&CombatantId>,
    ) {
        let message = CombatMessage::new(session.id(), kind, text);
        self.send_to_players(session, &message, except);
    }

    fn send_to_players(
        &self,
        session: &CombatInstance,
        message: &CombatMessage,
        except: Option<&CombatantId>,
    ) {
        for player in session.players() {
            if player.has_fled() || except == Some(&player.id) {
                continue;
            }
            let Some(owner) = &player.owner else {
                continue;
            };
            if let Err(err) = self.sink.send_to_user(owner, message) {
                debug!(user_id = %owner, error = %err, "notification dropped");
            }
        }
    }

    /// Checks out the fight a player can act in.
    fn player_session(&self, player: &CombatantId) -> Result<CombatSession, ActionReport> {
        let id = self
            .manager
            .instance_id_for_player(player)
            .ok_or_else(|| ActionReport::rejected(NOT_IN_COMBAT))?;
        let session = self
            .manager
            .checkout(id)
            .ok_or_else(|| ActionReport::rejected(BUSY))?;
        if session.state() != CombatState::Active {
            return Err(ActionReport::rejected("The fight is over."));
        }
        match session.player(player).map(Combatant::can_act) {
            None => Err(ActionReport::rejected(NOT_IN_COMBAT)),
            Some(false) => Err(ActionReport::rejected("You can no longer act in this fight.")),
            Some(true) => Ok(session),
        }
    }
}

fn fighting_enemy<'a>(instance: &'a CombatInstance, id: &CombatantId) -> Option<&'a Combatant> {
    instance.enemy(id).filter(|c| c.can_act())
}

/// Preferred target if still fighting, else the auto-attack target, else
/// the first enemy still fighting.
fn attack_target(
    instance: &CombatInstance,
    player: &CombatantId,
    preferred: Option<&CombatantId>,
) -> Option<CombatantId> {
    let auto = instance
        .player(player)
        .and_then(|c| c.auto_attack_target.as_ref());
    preferred
        .and_then(|id| fighting_enemy(instance, id))
        .or_else(|| auto.and_then(|id| fighting_enemy(instance, id)))
        .or_else(|| instance.living_enemies().next())
        .map(|c| c.id.clone())
}

fn escaped(resolution: &Resolution) -> bool {
    matches!(resolution, Resolution::Flee(FleeOutcome { success: true, .. }))
}

fn end_message(state: CombatState) -> &'static str {
    match state {
        CombatState::Victory => "Victory! All enemies have been defeated.",
        CombatState::Defeat => "Defeat... your party has fallen.",
        CombatState::Fled => "You escaped from combat.",
        CombatState::Timeout => "Combat has timed out due to inactivity.",
        CombatState::Pending | CombatState::Active => "Combat ended.",
    }
}
