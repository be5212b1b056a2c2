//! NPC decision making.

use crate::combatant::{CombatAction, Combatant, CombatantId};
use crate::instance::CombatInstance;

/// Picks what an NPC does on its turn.
///
/// An NPC whose HP fraction is at or below `flee_threshold` (when the
/// threshold is positive) tries to flee. Otherwise it attacks the player
/// with the lowest HP fraction; on a tie the player who joined first is
/// picked. With nobody to attack it defends.
#[must_use]
pub fn choose_npc_action(
    instance: &CombatInstance,
    npc: &CombatantId,
    flee_threshold: f64,
) -> (CombatAction, Option<CombatantId>) {
    if let Some(me) = instance.get(npc) {
        if flee_threshold > 0.0 && me.hp_fraction() <= flee_threshold {
            return (CombatAction::Flee, None);
        }
    }

    let mut weakest: Option<&Combatant> = None;
    for player in instance.living_players() {
        if weakest.map_or(true, |w| player.hp_fraction() < w.hp_fraction()) {
            weakest = Some(player);
        }
    }

    match weakest {
        Some(target) => (CombatAction::Attack, Some(target.id.clone())),
        None => (CombatAction::Defend, None),
    }
}
