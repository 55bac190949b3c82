//! Zone-aware ball boundary enforcement.
//!
//! The physics engine owns normal wall response; this pass is the safety net
//! that guarantees the ball never leaves the arena ∪ goal-net envelope, even
//! after a missed contact or an extreme impulse. Applying it twice in a row
//! yields identical state: positions land exactly on the limit and a
//! velocity component is only reflected while it still points outward.

use rapier3d::prelude::{Real, Vector};

use super::tuning::{
    ARENA_HALF_DEPTH, ARENA_HALF_WIDTH, BALL_RADIUS, CEILING_DAMPING, GOAL_BACK_X,
    GOAL_HALF_WIDTH, GOAL_HEIGHT, GOAL_RESTITUTION, GROUND_RESTITUTION, WALL_HEIGHT,
    WALL_RESTITUTION,
};

/// Clamp the ball into the legal envelope. Mutates position and velocity in
/// place; returns true if anything was corrected.
pub fn enforce(pos: &mut Vector<Real>, vel: &mut Vector<Real>) -> bool {
    let mut corrected = false;

    // Floor
    if pos.y < BALL_RADIUS {
        pos.y = BALL_RADIUS;
        if vel.y < 0.0 {
            vel.y = -vel.y * GROUND_RESTITUTION;
        }
        corrected = true;
    }

    // Ceiling
    let ceiling = WALL_HEIGHT - BALL_RADIUS;
    if pos.y > ceiling {
        pos.y = ceiling;
        if vel.y > 0.0 {
            vel.y = -vel.y * CEILING_DAMPING;
        }
        corrected = true;
    }

    let in_goal_mouth = pos.z.abs() < GOAL_HALF_WIDTH && pos.y < GOAL_HEIGHT;

    if pos.x.abs() > ARENA_HALF_WIDTH {
        // Deep in a goal. Legal only inside the net envelope; anything else
        // is pushed back to the arena wall rather than into the net.
        if in_goal_mouth {
            let net_half = GOAL_HALF_WIDTH - BALL_RADIUS;
            if pos.z.abs() > net_half {
                let sign = pos.z.signum();
                pos.z = sign * net_half;
                if vel.z * sign > 0.0 {
                    vel.z = -vel.z * WALL_RESTITUTION;
                }
                corrected = true;
            }
            let back = GOAL_BACK_X - BALL_RADIUS;
            if pos.x.abs() > back {
                let sign = pos.x.signum();
                pos.x = sign * back;
                if vel.x * sign > 0.0 {
                    vel.x = -vel.x * GOAL_RESTITUTION;
                }
                corrected = true;
            }
        } else {
            let limit = ARENA_HALF_WIDTH - BALL_RADIUS;
            let sign = pos.x.signum();
            pos.x = sign * limit;
            if vel.x * sign > 0.0 {
                vel.x = -vel.x * WALL_RESTITUTION;
            }
            corrected = true;
        }
    } else {
        // Main arena: z against the side walls, x against the end walls
        // unless the ball is lined up with a goal opening.
        let depth_limit = ARENA_HALF_DEPTH - BALL_RADIUS;
        if pos.z.abs() > depth_limit {
            let sign = pos.z.signum();
            pos.z = sign * depth_limit;
            if vel.z * sign > 0.0 {
                vel.z = -vel.z * WALL_RESTITUTION;
            }
            corrected = true;
        }

        if !in_goal_mouth {
            let width_limit = ARENA_HALF_WIDTH - BALL_RADIUS;
            if pos.x.abs() > width_limit {
                let sign = pos.x.signum();
                pos.x = sign * width_limit;
                if vel.x * sign > 0.0 {
                    vel.x = -vel.x * WALL_RESTITUTION;
                }
                corrected = true;
            }
        }
    }

    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::vector;

    #[test]
    fn floor_reflects_with_ground_restitution() {
        let mut pos = vector![0.0, 0.5, 0.0];
        let mut vel = vector![0.0, -5.0, 0.0];
        assert!(enforce(&mut pos, &mut vel));
        assert_eq!(pos.y, BALL_RADIUS);
        assert!((vel.y - 5.0 * GROUND_RESTITUTION).abs() < 1e-6);
    }

    #[test]
    fn ceiling_damps_hard() {
        let mut pos = vector![0.0, 9.9, 0.0];
        let mut vel = vector![0.0, 8.0, 0.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.y, WALL_HEIGHT - BALL_RADIUS);
        assert!((vel.y + 8.0 * CEILING_DAMPING).abs() < 1e-6);
    }

    #[test]
    fn side_walls_bounce() {
        let mut pos = vector![0.0, 1.0, 9.4];
        let mut vel = vector![0.0, 0.0, 3.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.z, ARENA_HALF_DEPTH - BALL_RADIUS);
        assert!((vel.z + 3.0 * WALL_RESTITUTION).abs() < 1e-6);
    }

    #[test]
    fn end_wall_blocks_outside_goal_mouth() {
        let mut pos = vector![14.2, 1.0, 5.0];
        let mut vel = vector![6.0, 0.0, 0.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.x, ARENA_HALF_WIDTH - BALL_RADIUS);
        assert!(vel.x < 0.0);
    }

    #[test]
    fn goal_mouth_lets_the_ball_run_deep() {
        let mut pos = vector![14.2, 1.0, 0.0];
        let mut vel = vector![6.0, 0.0, 0.0];
        let corrected = enforce(&mut pos, &mut vel);
        assert!(!corrected);
        assert_eq!(pos.x, 14.2);
        assert_eq!(vel.x, 6.0);
    }

    #[test]
    fn goal_back_wall_returns_the_ball() {
        let mut pos = vector![16.8, 1.0, 0.0];
        let mut vel = vector![10.0, 0.0, 0.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.x, GOAL_BACK_X - BALL_RADIUS);
        assert!((vel.x + 10.0 * GOAL_RESTITUTION).abs() < 1e-6);
    }

    #[test]
    fn net_sides_seal_the_goal_interior() {
        let mut pos = vector![15.5, 1.0, 2.2];
        let mut vel = vector![0.0, 0.0, 2.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.z, GOAL_HALF_WIDTH - BALL_RADIUS);
        assert!(vel.z < 0.0);
        // x untouched, the ball stays in the net
        assert_eq!(pos.x, 15.5);
    }

    #[test]
    fn deep_but_outside_net_width_is_pushed_back_to_arena() {
        let mut pos = vector![15.5, 1.0, 4.0];
        let mut vel = vector![3.0, 0.0, 0.0];
        enforce(&mut pos, &mut vel);
        assert_eq!(pos.x, ARENA_HALF_WIDTH - BALL_RADIUS);
        assert_eq!(pos.z, 4.0);
    }

    #[test]
    fn enforcement_is_idempotent() {
        let cases = [
            (vector![16.8, 0.2, 2.4], vector![12.0, -3.0, 4.0]),
            (vector![-15.2, 9.9, -0.5], vector![-8.0, 6.0, -1.0]),
            (vector![0.0, 0.1, -9.9], vector![0.0, -1.0, -5.0]),
            (vector![14.4, 5.0, 6.0], vector![2.0, 0.0, 2.0]),
        ];
        for (p0, v0) in cases {
            let mut pos = p0;
            let mut vel = v0;
            enforce(&mut pos, &mut vel);
            let (p1, v1) = (pos, vel);
            let second = enforce(&mut pos, &mut vel);
            assert!(!second, "second pass corrected {p0:?}");
            assert_eq!(pos, p1);
            assert_eq!(vel, v1);
        }
    }

    #[test]
    fn ball_never_escapes_envelope() {
        // sweep a grid of wild states through the enforcer and check the
        // quantified invariant
        for xi in -20..=20 {
            for zi in -12..=12 {
                for yi in 0..=12 {
                    let mut pos = vector![xi as f32, yi as f32, zi as f32];
                    let mut vel = vector![30.0, -30.0, 30.0];
                    enforce(&mut pos, &mut vel);
                    assert!(pos.x.abs() <= GOAL_BACK_X - BALL_RADIUS + 1e-4);
                    assert!(pos.y >= BALL_RADIUS - 1e-4);
                    assert!(pos.y <= WALL_HEIGHT - BALL_RADIUS + 1e-4);
                    assert!(
                        pos.x.abs() <= ARENA_HALF_WIDTH - BALL_RADIUS + 1e-4
                            || (pos.z.abs() <= GOAL_HALF_WIDTH - BALL_RADIUS + 1e-4
                                && pos.y <= GOAL_HEIGHT),
                    );
                }
            }
        }
    }
}
