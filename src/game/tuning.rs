//! Authoritative gameplay tuning. Clients must agree with these values for
//! reconciliation to line up with server state.

use crate::util::time::secs_to_ticks;

// --- Player movement ---

pub const MOVE_SPEED: f32 = 8.0;
pub const GRAVITY: f32 = 20.0;
pub const JUMP_FORCE: f32 = 8.0;
pub const MAX_JUMPS: u8 = 2;
pub const DOUBLE_JUMP_MULTIPLIER: f32 = 0.8;
pub const GROUND_Y: f32 = 0.1;
pub const GROUND_CHECK_EPSILON: f32 = 0.05;
pub const VELOCITY_SMOOTHING: f32 = 0.95;

// --- Bodies ---

pub const BALL_RADIUS: f32 = 0.8;
pub const BALL_MASS: f32 = 1.0;
pub const BALL_RESTITUTION: f32 = 0.7;
pub const BALL_LINEAR_DAMPING: f32 = 0.2;
pub const BALL_ANGULAR_DAMPING: f32 = 0.5;
pub const MAX_ANG_VEL: f32 = 15.0;
pub const PLAYER_RADIUS: f32 = 0.4;
pub const GIANT_RADIUS: f32 = 2.0;

// --- Arena envelope (meters) ---

pub const ARENA_HALF_WIDTH: f32 = 14.5;
pub const ARENA_HALF_DEPTH: f32 = 9.5;
pub const WALL_HEIGHT: f32 = 10.0;
pub const GOAL_LINE_X: f32 = 10.8;
pub const GOAL_BACK_X: f32 = 17.0;
pub const GOAL_HALF_WIDTH: f32 = 2.5;
pub const GOAL_HEIGHT: f32 = 4.0;

// --- Restitution per boundary zone ---

pub const WALL_RESTITUTION: f32 = 0.3;
pub const GOAL_RESTITUTION: f32 = 0.3;
pub const GROUND_RESTITUTION: f32 = 0.9;
pub const CEILING_DAMPING: f32 = 0.1;

// --- Player-ball contact model ---

pub const BALL_STABILITY_HEIGHT_MIN: f32 = 0.3;
pub const BALL_STABILITY_VELOCITY_THRESHOLD: f32 = 1.5;
pub const BALL_STABILITY_DAMPING: f32 = 0.92;
pub const BALL_STABILITY_CORRECTION: f32 = 0.3;
pub const BALL_STABILITY_IMPULSE_CAP: f32 = 2.0;
pub const COLLISION_VELOCITY_THRESHOLD: f32 = 3.0;
pub const PLAYER_BALL_VELOCITY_TRANSFER: f32 = 0.7;
pub const PLAYER_BALL_APPROACH_BOOST: f32 = 1.4;
pub const PLAYER_BALL_RESTITUTION: f32 = 0.85;
pub const PLAYER_BALL_IMPULSE_MIN: f32 = 8.0;
pub const COLLISION_LIFT: f32 = 8.0;
pub const COLLISION_LIFT_GIANT: f32 = 10.0;
pub const CONTACT_MARGIN: f32 = 0.1;

// --- Kicks ---

pub const KICK_RANGE: f32 = 3.0;
pub const KICK_VERTICAL_BOOST: f32 = 2.0;
/// Sanity bound on client-supplied kick impulse magnitude
pub const KICK_IMPULSE_MAX: f32 = 80.0;

// --- Match flow ---

pub const MAX_CLIENTS: usize = 4;
pub const TEAM_CAP: usize = 2;
pub const INPUT_QUEUE_MAX: usize = 60;
pub const MATCH_TIMER_START: f32 = 300.0;
pub const GOAL_COOLDOWN_MS: u64 = 5_000;
pub const GOAL_RESET_DELAY_MS: u64 = 3_000;
pub const EMPTY_DISPOSE_DELAY_MS: u64 = 30_000;
pub const END_GAME_GRACE_MS: u64 = 5_000;
pub const CHAT_MAX_LEN: usize = 500;

// --- Power-ups ---

pub const POWERUP_MAX_ACTIVE: usize = 3;
pub const POWERUP_PICKUP_RANGE: f32 = 1.5;
pub const POWERUP_SPAWN_Y: f32 = 0.5;
pub const POWERUP_SPAWN_INTERVAL_TICKS: u64 = secs_to_ticks(20);
pub const POWERUP_LIFETIME_TICKS: u64 = secs_to_ticks(15);
pub const POWERUP_EFFECT_TICKS: u64 = secs_to_ticks(15);
pub const SPEED_RAMP_UP_STEPS: u64 = 10;
pub const SPEED_RAMP_UP_TICKS: u64 = 30; // 500 ms
pub const SPEED_RAMP_DOWN_STEPS: u64 = 20;
pub const SPEED_RAMP_DOWN_TICKS: u64 = 60; // 1 s
pub const SPEED_MULT_MAX: f32 = 2.0;
pub const JUMP_MULT_ACTIVE: f32 = 1.5;
pub const KICK_MULT_ACTIVE: f32 = 2.0;
/// Ball closer than this when a giant spawns gets teleported out of the way
pub const GIANT_BALL_CLEARANCE: f32 = 3.5;
pub const GIANT_BALL_TELEPORT_DIST: f32 = 4.0;

// --- Spawn points ---

pub const BALL_SPAWN: [f32; 3] = [0.0, 2.0, 0.0];
pub const RED_SPAWN: [f32; 3] = [-6.0, GROUND_Y, 0.0];
pub const BLUE_SPAWN: [f32; 3] = [6.0, GROUND_Y, 0.0];
