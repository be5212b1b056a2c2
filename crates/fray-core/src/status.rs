//! Read-only view of a fight from one player's seat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::combatant::{CombatAction, Combatant, CombatantId};
use crate::instance::{CombatInstance, CombatState, InstanceId};

const BAR_WIDTH: usize = 10;

/// One combatant as shown in a status summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantLine {
    /// Combatant id.
    pub id: CombatantId,
    /// Display name.
    pub name: String,
    /// Current hit points.
    pub current_hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Rolled initiative.
    pub initiative: i32,
    /// Down.
    pub dead: bool,
    /// Escaped.
    pub fled: bool,
    /// It is this combatant's turn.
    pub acting: bool,
}

impl CombatantLine {
    fn new(c: &Combatant, acting: Option<&CombatantId>) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            current_hp: c.current_hp,
            max_hp: c.max_hp,
            initiative: c.initiative,
            dead: !c.is_alive(),
            fled: c.has_fled(),
            acting: acting == Some(&c.id),
        }
    }

    fn tag(&self) -> &'static str {
        if self.dead {
            " [DEAD]"
        } else if self.fled {
            " [FLED]"
        } else {
            ""
        }
    }
}

/// Snapshot of a fight for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSummary {
    /// Fight id.
    pub instance_id: InstanceId,
    /// Player the summary was built for.
    pub viewer: CombatantId,
    /// Current round.
    pub round: u32,
    /// Lifecycle state.
    pub state: CombatState,
    /// Player roster.
    pub party: Vec<CombatantLine>,
    /// Enemy roster.
    pub enemies: Vec<CombatantLine>,
    /// This round's turn order.
    pub turn_order: Vec<CombatantLine>,
    /// It is the viewer's turn.
    pub your_turn: bool,
    /// Seconds left on the current turn.
    pub seconds_remaining: u64,
    /// Name of the viewer's auto-attack target, if still fighting.
    pub auto_attack_target: Option<String>,
    /// The viewer's queued action and its target's name.
    pub queued: Option<(CombatAction, Option<String>)>,
}

impl CombatSummary {
    /// Builds the summary of `instance` as seen by `viewer`.
    #[must_use]
    pub fn new(instance: &CombatInstance, viewer: &CombatantId, now: DateTime<Utc>) -> Self {
        let acting = instance.current().map(|c| c.id.clone());
        let acting = acting.as_ref();
        let me = instance.player(viewer);
        let name_of = |id: &CombatantId| instance.get(id).map(|c| c.name.clone());

        Self {
            instance_id: instance.id(),
            viewer: viewer.clone(),
            round: instance.round(),
            state: instance.state(),
            party: instance.players().map(|c| CombatantLine::new(c, acting)).collect(),
            enemies: instance.enemies().map(|c| CombatantLine::new(c, acting)).collect(),
            turn_order: instance.turn_order().map(|c| CombatantLine::new(c, acting)).collect(),
            your_turn: acting == Some(viewer),
            seconds_remaining: instance.turn_time_remaining(now),
            auto_attack_target: me
                .and_then(|c| c.auto_attack_target.as_ref())
                .filter(|id| instance.get(id).is_some_and(Combatant::can_act))
                .and_then(name_of),
            queued: me
                .and_then(|c| c.queued.as_ref())
                .map(|q| (q.action, q.target.as_ref().and_then(name_of))),
        }
    }
}

/// `[████░░░░░░]` scaled to `current / max`.
#[must_use]
pub fn hp_bar(current: i32, max: i32) -> String {
    let filled = if max <= 0 {
        0
    } else {
        let ratio = f64::from(current.clamp(0, max)) / f64::from(max);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let cells = (ratio * BAR_WIDTH as f64).round() as usize;
        cells.min(BAR_WIDTH)
    };
    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

impl fmt::Display for CombatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== COMBAT STATUS - Round {} ===", self.round)?;
        writeln!(f)?;
        writeln!(f, "YOUR PARTY:")?;
        for line in &self.party {
            let marker = if line.acting { "> " } else { "  " };
            writeln!(
                f,
                "{marker}{:<16} {} {}/{} HP{}",
                line.name,
                hp_bar(line.current_hp, line.max_hp),
                line.current_hp,
                line.max_hp,
                line.tag()
            )?;
        }
        writeln!(f)?;
        writeln!(f, "ENEMIES:")?;
        for line in &self.enemies {
            writeln!(
                f,
                "  {:<16} {} {}/{} HP{}",
                line.name,
                hp_bar(line.current_hp, line.max_hp),
                line.current_hp,
                line.max_hp,
                line.tag()
            )?;
        }
        writeln!(f)?;
        writeln!(f, "TURN ORDER:")?;
        for (i, line) in self.turn_order.iter().enumerate() {
            let marker = if line.acting { "> " } else { "  " };
            writeln!(f, "{marker}{}. {} ({})", i + 1, line.name, line.initiative)?;
        }
        if let Some(target) = &self.auto_attack_target {
            writeln!(f)?;
            writeln!(f, "Auto-attacking: {target}")?;
        }
        if let Some((action, target)) = &self.queued {
            match target {
                Some(target) => writeln!(f, "Queued action: {action} {target}")?,
                None => writeln!(f, "Queued action: {action}")?,
            }
        }
        if self.your_turn {
            write!(f, "Your turn! {}s remaining.", self.seconds_remaining)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::QueuedAction;
    use crate::instance::{RoomId, Slot};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn bar_scales_with_hp() {
        assert_eq!(hp_bar(10, 10), "[██████████]");
        assert_eq!(hp_bar(5, 10), "[█████░░░░░]");
        assert_eq!(hp_bar(0, 10), "[░░░░░░░░░░]");
        assert_eq!(hp_bar(3, 0), "[░░░░░░░░░░]");
    }

    #[test]
    fn summary_marks_viewer_turn_and_tags() {
        let mut fight = CombatInstance::new(RoomId::new("hall"), t0());
        let p1: Slot = fight
            .add_player(Combatant::player("p1", "Ayla").with_hp(20, 20))
            .unwrap();
        fight.add_player(Combatant::player("p2", "Bram").with_hp(0, 20));
        fight.add_enemy(Combatant::npc("n1", "Ghoul").with_hp(8, 10));
        fight.get_mut(&"p2".into()).unwrap().take_damage(1);
        fight.set_turn_order(vec![p1]);
        {
            let ayla = fight.get_mut(&"p1".into()).unwrap();
            ayla.auto_attack_target = Some("n1".into());
            ayla.queued = Some(QueuedAction::attack("n1".into()));
        }

        let summary = CombatSummary::new(&fight, &"p1".into(), t0());
        assert!(summary.your_turn);
        assert_eq!(summary.seconds_remaining, 60);
        assert!(summary.party[1].dead);
        assert_eq!(summary.auto_attack_target.as_deref(), Some("Ghoul"));
        assert_eq!(
            summary.queued,
            Some((CombatAction::Attack, Some("Ghoul".to_string())))
        );

        let text = summary.to_string();
        assert!(text.contains("Round 1"));
        assert!(text.contains("Bram"));
        assert!(text.contains("[DEAD]"));
        assert!(text.contains("> 1. Ayla"));
        assert!(text.contains("Queued action: attack Ghoul"));
    }
}
