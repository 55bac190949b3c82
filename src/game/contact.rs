//! Player↔ball contact model, layered on top of the physics step.
//!
//! Two branches: a stability mode that lets a slow ball rest on a player's
//! head and travel with them, and an approach-only impulse branch that
//! transfers player momentum into the ball. Moving apart never produces an
//! impulse, so the engine's own restitution handles separation.

use rapier3d::prelude::{vector, Real, Vector};

use super::player::PlayerState;
use super::tuning::{
    BALL_MASS, BALL_RADIUS, BALL_STABILITY_CORRECTION, BALL_STABILITY_DAMPING,
    BALL_STABILITY_HEIGHT_MIN, BALL_STABILITY_IMPULSE_CAP, BALL_STABILITY_VELOCITY_THRESHOLD,
    COLLISION_LIFT, COLLISION_LIFT_GIANT, COLLISION_VELOCITY_THRESHOLD, CONTACT_MARGIN,
    KICK_IMPULSE_MAX, KICK_RANGE, KICK_VERTICAL_BOOST, PLAYER_BALL_APPROACH_BOOST,
    PLAYER_BALL_IMPULSE_MIN, PLAYER_BALL_RESTITUTION, PLAYER_BALL_VELOCITY_TRANSFER,
};

/// What the resolver wants done to the ball
#[derive(Debug, Clone, PartialEq)]
pub enum ContactResponse {
    /// Ball-on-head carry: overwrite velocity, pull position upward toward
    /// the head rest point
    Stabilize {
        velocity: Vector<Real>,
        position: Vector<Real>,
    },
    /// Momentum-transfer impulse
    Impulse { impulse: Vector<Real> },
}

/// Resolve one player against the ball. Returns None when the spheres are
/// not touching or the bodies are separating.
pub fn resolve_player_ball(
    player: &PlayerState,
    ball_pos: Vector<Real>,
    ball_vel: Vector<Real>,
) -> Option<ContactResponse> {
    let radius = player.contact_radius();
    let player_pos = vector![player.x, player.y, player.z];
    let d = ball_pos - player_pos;
    let dist = d.norm();
    if dist >= radius + BALL_RADIUS + CONTACT_MARGIN {
        return None;
    }

    let n = if dist > 1e-6 {
        d / dist
    } else {
        vector![0.0, 1.0, 0.0]
    };
    let dy = ball_pos.y - player.y;
    let player_vel = vector![player.vx, player.vy, player.vz];
    let v_rel = player_vel - ball_vel;

    let on_head = dy > BALL_STABILITY_HEIGHT_MIN && n.y > 0.5;

    if on_head && v_rel.norm() < BALL_STABILITY_VELOCITY_THRESHOLD {
        // Resting carry: the ball follows the player horizontally while its
        // vertical motion bleeds off
        let velocity = vector![player.vx, ball_vel.y * BALL_STABILITY_DAMPING, player.vz];
        let target_y = player.y + radius + BALL_RADIUS + 0.05;
        let corrected = vector![
            ball_pos.x + (player.x - ball_pos.x) * BALL_STABILITY_CORRECTION,
            // correction may only raise the ball, never push it down
            ball_pos.y.max(ball_pos.y + (target_y - ball_pos.y) * BALL_STABILITY_CORRECTION),
            ball_pos.z + (player.z - ball_pos.z) * BALL_STABILITY_CORRECTION
        ];
        return Some(ContactResponse::Stabilize {
            velocity,
            position: corrected,
        });
    }

    let approach_speed = v_rel.dot(&n);
    if approach_speed <= 0.0 {
        return None;
    }

    let player_speed = (player.vx * player.vx + player.vz * player.vz).sqrt();
    let is_running = player_speed > COLLISION_VELOCITY_THRESHOLD;
    let momentum_factor = if is_running {
        (player_speed / 8.0) * PLAYER_BALL_VELOCITY_TRANSFER
    } else {
        0.5
    };
    let approach_dot = (player.vx * n.x + player.vz * n.z) / (player_speed + 1e-6);
    let approach_boost = if approach_dot > 0.5 {
        PLAYER_BALL_APPROACH_BOOST
    } else {
        1.0
    };

    let mut impulse_mag = approach_speed
        * BALL_MASS
        * (1.0 + PLAYER_BALL_RESTITUTION)
        * momentum_factor
        * approach_boost;

    if on_head {
        // Ball sits on the head but motion disqualified the carry; keep the
        // pop proportional to how fast the player is actually moving
        impulse_mag = impulse_mag.min(BALL_STABILITY_IMPULSE_CAP * player_speed);
    } else {
        impulse_mag = impulse_mag.max(PLAYER_BALL_IMPULSE_MIN);
    }

    let lift = if player.effects.giant_active() {
        COLLISION_LIFT_GIANT
    } else {
        COLLISION_LIFT
    };

    let impulse = vector![
        n.x * impulse_mag,
        (n.y * impulse_mag).max(0.5) + lift,
        n.z * impulse_mag
    ];
    Some(ContactResponse::Impulse { impulse })
}

/// Whether the player is close enough to the ball for an explicit kick
pub fn in_kick_range(player: &PlayerState, ball_pos: Vector<Real>) -> bool {
    let player_pos = vector![player.x, player.y, player.z];
    (ball_pos - player_pos).norm() <= KICK_RANGE
}

/// Shape a client kick impulse: sanity-clamp the magnitude, then add the
/// fixed vertical boost. kickMult is already applied client-side.
pub fn shape_kick_impulse(ix: f32, iy: f32, iz: f32) -> Option<Vector<Real>> {
    if !ix.is_finite() || !iy.is_finite() || !iz.is_finite() {
        return None;
    }
    let mut raw = vector![ix, iy, iz];
    let mag = raw.norm();
    if mag > KICK_IMPULSE_MAX {
        raw *= KICK_IMPULSE_MAX / mag;
    }
    Some(vector![raw.x, raw.y + KICK_VERTICAL_BOOST, raw.z])
}
