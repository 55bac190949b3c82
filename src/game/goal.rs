//! Goal detection, anti-double-fire cooldown, and touch attribution

use rapier3d::prelude::{Real, Vector};
use uuid::Uuid;

use super::tuning::{BALL_RADIUS, GOAL_COOLDOWN_MS, GOAL_HALF_WIDTH, GOAL_HEIGHT, GOAL_LINE_X};
use crate::ws::protocol::Team;

/// Last two distinct ball touchers, for goal/assist attribution
#[derive(Debug, Default, Clone, Copy)]
pub struct TouchHistory {
    pub last: Option<Uuid>,
    pub second_last: Option<Uuid>,
}

impl TouchHistory {
    /// Record a touch. Consecutive touches by the same player collapse into
    /// one entry so dribbling does not overwrite the provider of the pass.
    pub fn record(&mut self, session_id: Uuid) {
        if self.last == Some(session_id) {
            return;
        }
        self.second_last = self.last;
        self.last = Some(session_id);
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.second_last = None;
    }
}

/// Goal test. The cooldown uses timestamps rather than timers so it holds
/// even when ticks run late.
pub fn detect_goal(ball_pos: Vector<Real>, last_goal_ms: u64, now_ms: u64) -> Option<Team> {
    if now_ms.saturating_sub(last_goal_ms) < GOAL_COOLDOWN_MS {
        return None;
    }
    let past_line = ball_pos.x.abs() > GOAL_LINE_X + BALL_RADIUS;
    let in_mouth = ball_pos.z.abs() < GOAL_HALF_WIDTH && ball_pos.y < GOAL_HEIGHT;
    if !(past_line && in_mouth) {
        return None;
    }
    Some(if ball_pos.x > 0.0 { Team::Red } else { Team::Blue })
}

/// Assist goes to the second-last toucher iff they exist, are a different
/// session, and play for the scoring player's team.
pub fn assist_for(
    scorer: Option<(Uuid, Team)>,
    second_last: Option<(Uuid, Team)>,
) -> Option<Uuid> {
    let (scorer_id, scorer_team) = scorer?;
    let (assist_id, assist_team) = second_last?;
    if assist_id != scorer_id && assist_team == scorer_team {
        Some(assist_id)
    } else {
        None
    }
}
