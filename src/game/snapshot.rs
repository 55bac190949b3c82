//! Snapshot cadence and assembly

use super::player::PlayerState;
use super::powerup::PowerUp;
use crate::ws::protocol::{BallSnapshot, GamePhase, PlayerSnapshot, PowerUpSnapshot, ServerMsg};

/// Assembles authoritative snapshots at the patch rate (every
/// `snapshot_interval` sim ticks).
pub struct SnapshotBuilder {
    ticks_since_snapshot: u32,
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used after important transitions)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message from the authoritative state
    #[allow(clippy::too_many_arguments)]
    pub fn build<'a>(
        &self,
        tick: u64,
        phase: GamePhase,
        timer: f32,
        red_score: u32,
        blue_score: u32,
        map: &str,
        players: impl Iterator<Item = &'a PlayerState>,
        power_ups: &[PowerUp],
        ball: BallSnapshot,
    ) -> ServerMsg {
        let players = players
            .map(|p| PlayerSnapshot {
                session_id: p.session_id,
                name: p.name.clone(),
                team: p.team,
                character: p.character.clone(),
                x: p.x,
                y: p.y,
                z: p.z,
                rot_y: p.rot_y,
                vx: p.vx,
                vy: p.vy,
                vz: p.vz,
                jump_count: p.jump_count,
                invisible: p.invisible,
                giant: p.giant,
                speed_mult: p.speed_mult,
                jump_mult: p.jump_mult,
                kick_mult: p.kick_mult,
                goals: p.goals,
                assists: p.assists,
                shots: p.shots,
                last_received_tick: p.last_received_tick,
            })
            .collect();

        let power_ups = power_ups
            .iter()
            .map(|item| PowerUpSnapshot {
                id: item.id,
                kind: item.kind,
                x: item.x,
                y: item.y,
                z: item.z,
            })
            .collect();

        ServerMsg::Snapshot {
            tick,
            phase,
            timer,
            red_score,
            blue_score,
            selected_map: map.to_string(),
            players,
            power_ups,
            ball,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_every_other_tick_at_default_rates() {
        let mut builder = SnapshotBuilder::new(2);
        let pattern: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(pattern, vec![false, true, false, true, false, true]);
    }

    #[test]
    fn force_next_overrides_cadence() {
        let mut builder = SnapshotBuilder::new(2);
        builder.force_next();
        assert!(builder.should_send());
        assert!(!builder.should_send());
    }
}
