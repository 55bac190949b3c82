//! Input pipeline: validation, ordered enqueue with tick dedup, and
//! one-record-per-tick consumption with last-input replay.

use super::player::PlayerState;
use super::tuning::INPUT_QUEUE_MAX;
use crate::ws::protocol::InputFrame;

/// Movement axes may carry float noise slightly past the unit range before
/// the record counts as malformed
const AXIS_TOLERANCE: f32 = 1.001;

/// Validate one client record. Malformed records are dropped silently per
/// the error policy; surviving axes are clamped to the unit range.
pub fn validate(frame: &InputFrame) -> Option<InputFrame> {
    if !frame.x.is_finite() || !frame.z.is_finite() || !frame.rot_y.is_finite() {
        return None;
    }
    if frame.x.abs() > AXIS_TOLERANCE || frame.z.abs() > AXIS_TOLERANCE {
        return None;
    }
    let mut out = *frame;
    out.x = out.x.clamp(-1.0, 1.0);
    out.z = out.z.clamp(-1.0, 1.0);
    out.rot_y = wrap_angle(out.rot_y);
    Some(out)
}

fn wrap_angle(a: f32) -> f32 {
    let wrapped = a.rem_euclid(std::f32::consts::TAU);
    if wrapped > std::f32::consts::PI {
        wrapped - std::f32::consts::TAU
    } else {
        wrapped
    }
}

/// Enqueue a batch of records for a player. Records are sorted by tick,
/// deduplicated against `last_received_tick`, and the queue is trimmed from
/// the front past the flood cap.
pub fn enqueue(player: &mut PlayerState, mut frames: Vec<InputFrame>) {
    frames.sort_by_key(|f| f.tick);
    for frame in frames {
        let Some(frame) = validate(&frame) else {
            continue;
        };
        if frame.tick <= player.last_received_tick {
            continue;
        }
        player.last_received_tick = frame.tick;
        player.input_queue.push_back(frame);
    }
    while player.input_queue.len() > INPUT_QUEUE_MAX {
        player.input_queue.pop_front();
    }
}

/// Take the record to consume this tick. Exactly one per tick: the oldest
/// queued record, or the last consumed input with movement nulled so a
/// stalled client stops in place (the unchanged jumpRequestId cannot
/// re-trigger a jump).
pub fn next_frame(player: &mut PlayerState) -> InputFrame {
    match player.input_queue.pop_front() {
        Some(frame) => {
            player.last_input = frame;
            frame
        }
        None => {
            let mut fallback = player.last_input;
            fallback.x = 0.0;
            fallback.z = 0.0;
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Team;
    use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
    use uuid::Uuid;

    fn test_player() -> PlayerState {
        PlayerState::new(
            Uuid::new_v4(),
            "tester".into(),
            Team::Blue,
            "default".into(),
            RigidBodyHandle::invalid(),
            ColliderHandle::invalid(),
            0,
        )
    }

    fn frame(tick: u64) -> InputFrame {
        InputFrame {
            tick,
            x: 0.5,
            z: 0.0,
            rot_y: 0.0,
            jump_request_id: 0,
        }
    }

    #[test]
    fn stale_ticks_are_dropped() {
        let mut p = test_player();
        enqueue(&mut p, vec![frame(5), frame(6)]);
        assert_eq!(p.last_received_tick, 6);
        assert_eq!(p.input_queue.len(), 2);

        // everything at or below the watermark is ignored
        enqueue(&mut p, vec![frame(6), frame(4)]);
        assert_eq!(p.input_queue.len(), 2);
        assert_eq!(p.last_received_tick, 6);
    }

    #[test]
    fn batches_are_sorted_before_dedup() {
        let mut p = test_player();
        enqueue(&mut p, vec![frame(9), frame(7), frame(8)]);
        let ticks: Vec<u64> = p.input_queue.iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![7, 8, 9]);
    }

    #[test]
    fn queue_trims_oldest_past_cap() {
        let mut p = test_player();
        enqueue(&mut p, (1..=80).map(frame).collect());
        assert_eq!(p.input_queue.len(), INPUT_QUEUE_MAX);
        assert_eq!(p.input_queue.front().unwrap().tick, 21);
        assert_eq!(p.input_queue.back().unwrap().tick, 80);
    }

    #[test]
    fn malformed_records_are_dropped() {
        let mut p = test_player();
        let bad_axis = InputFrame {
            tick: 1,
            x: 4.0,
            ..InputFrame::default()
        };
        let bad_nan = InputFrame {
            tick: 2,
            z: f32::NAN,
            ..InputFrame::default()
        };
        enqueue(&mut p, vec![bad_axis, bad_nan]);
        assert!(p.input_queue.is_empty());
        assert_eq!(p.last_received_tick, 0);
    }

    #[test]
    fn float_noise_is_clamped_not_dropped() {
        let mut p = test_player();
        let noisy = InputFrame {
            tick: 1,
            x: 1.0005,
            z: -1.0005,
            ..InputFrame::default()
        };
        enqueue(&mut p, vec![noisy]);
        let queued = p.input_queue.front().unwrap();
        assert_eq!(queued.x, 1.0);
        assert_eq!(queued.z, -1.0);
    }

    #[test]
    fn empty_queue_replays_last_input_with_zeroed_movement() {
        let mut p = test_player();
        let moving = InputFrame {
            tick: 3,
            x: 1.0,
            z: -0.5,
            rot_y: 0.7,
            jump_request_id: 9,
        };
        enqueue(&mut p, vec![moving]);

        let consumed = next_frame(&mut p);
        assert_eq!(consumed.tick, 3);
        assert_eq!(consumed.x, 1.0);

        // queue now empty: movement nulls out, rotation and jump id survive
        let fallback = next_frame(&mut p);
        assert_eq!(fallback.x, 0.0);
        assert_eq!(fallback.z, 0.0);
        assert!((fallback.rot_y - 0.7).abs() < 1e-6);
        assert_eq!(fallback.jump_request_id, 9);
    }

    #[test]
    fn one_record_consumed_per_call() {
        let mut p = test_player();
        enqueue(&mut p, vec![frame(1), frame(2), frame(3)]);
        assert_eq!(next_frame(&mut p).tick, 1);
        assert_eq!(next_frame(&mut p).tick, 2);
        assert_eq!(next_frame(&mut p).tick, 3);
        assert_eq!(p.input_queue.len(), 0);
    }
}
