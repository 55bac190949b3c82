//! Player state and kinematic movement integration

use std::collections::VecDeque;

use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use uuid::Uuid;

use super::powerup::EffectState;
use super::tuning::{
    ARENA_HALF_DEPTH, ARENA_HALF_WIDTH, BLUE_SPAWN, DOUBLE_JUMP_MULTIPLIER, GIANT_RADIUS, GRAVITY,
    GROUND_CHECK_EPSILON, GROUND_Y, JUMP_FORCE, MAX_JUMPS, MOVE_SPEED, PLAYER_RADIUS, RED_SPAWN,
    VELOCITY_SMOOTHING,
};
use crate::ws::protocol::{InputFrame, Team};

/// Spawn point for a team
pub fn spawn_for(team: Team) -> [f32; 3] {
    match team {
        Team::Red => RED_SPAWN,
        Team::Blue => BLUE_SPAWN,
    }
}

/// Authoritative per-player state, owned by the match task
#[derive(Debug)]
pub struct PlayerState {
    pub session_id: Uuid,
    pub name: String,
    pub team: Team,
    pub character: String,

    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,

    // Kinematic pose and the derived velocity used by ground logic and
    // contact math
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,

    pub jump_count: u8,
    pub last_processed_jump_request_id: u32,

    // Input pipeline
    pub input_queue: VecDeque<InputFrame>,
    pub last_input: InputFrame,
    pub last_received_tick: u64,

    // Power-up state
    pub effects: EffectState,
    pub speed_mult: f32,
    pub jump_mult: f32,
    pub kick_mult: f32,

    // Visual flags (whitelisted for client update-state)
    pub invisible: bool,
    pub giant: bool,

    // Stats
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,

    pub joined_at: u64,
}

impl PlayerState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        name: String,
        team: Team,
        character: String,
        body: RigidBodyHandle,
        collider: ColliderHandle,
        joined_at: u64,
    ) -> Self {
        let spawn = spawn_for(team);
        Self {
            session_id,
            name,
            team,
            character,
            body,
            collider,
            x: spawn[0],
            y: spawn[1],
            z: spawn[2],
            rot_y: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            jump_count: 0,
            last_processed_jump_request_id: 0,
            input_queue: VecDeque::new(),
            last_input: InputFrame::default(),
            last_received_tick: 0,
            effects: EffectState::default(),
            speed_mult: 1.0,
            jump_mult: 1.0,
            kick_mult: 1.0,
            invisible: false,
            giant: false,
            goals: 0,
            assists: 0,
            shots: 0,
            joined_at,
        }
    }

    /// Contact sphere radius for the custom ball contact model
    pub fn contact_radius(&self) -> f32 {
        if self.effects.giant_active() {
            GIANT_RADIUS
        } else {
            PLAYER_RADIUS
        }
    }

    /// Put the player back on their team spawn with zeroed motion
    pub fn reset_to_spawn(&mut self) {
        let spawn = spawn_for(self.team);
        self.x = spawn[0];
        self.y = spawn[1];
        self.z = spawn[2];
        self.vx = 0.0;
        self.vy = 0.0;
        self.vz = 0.0;
        self.jump_count = 0;
    }

    /// One tick of kinematic movement. The caller commits the resulting pose
    /// to the physics body afterwards.
    ///
    /// Order matters: horizontal velocity, gravity, ground-contact jump
    /// reset, jump edge-trigger, position integration with floor snap, then
    /// the arena clamp.
    pub fn integrate(&mut self, input: &InputFrame, dt: f32) {
        let speed = MOVE_SPEED * self.speed_mult;

        // Instant stop on neutral stick, otherwise smooth toward the target
        if input.x == 0.0 && input.z == 0.0 {
            self.vx = 0.0;
            self.vz = 0.0;
        } else {
            self.vx += (input.x * speed - self.vx) * VELOCITY_SMOOTHING;
            self.vz += (input.z * speed - self.vz) * VELOCITY_SMOOTHING;
        }

        self.vy -= GRAVITY * dt;

        if self.y <= GROUND_Y + GROUND_CHECK_EPSILON && self.vy <= 0.0 {
            self.jump_count = 0;
        }

        self.apply_jump_trigger(input);

        let new_x = self.x + self.vx * dt;
        let mut new_y = self.y + self.vy * dt;
        let new_z = self.z + self.vz * dt;

        if new_y < GROUND_Y {
            new_y = GROUND_Y;
            self.vy = 0.0;
            self.jump_count = 0;
        }

        self.x = new_x.clamp(-ARENA_HALF_WIDTH, ARENA_HALF_WIDTH);
        self.y = new_y;
        self.z = new_z.clamp(-ARENA_HALF_DEPTH, ARENA_HALF_DEPTH);
        self.rot_y = input.rot_y;
    }

    /// Jump fires on the rising edge of the request id only, so replayed
    /// inputs cannot re-trigger it
    fn apply_jump_trigger(&mut self, input: &InputFrame) {
        if input.jump_request_id <= self.last_processed_jump_request_id {
            return;
        }
        if self.jump_count >= MAX_JUMPS {
            return;
        }
        self.last_processed_jump_request_id = input.jump_request_id;
        self.jump_count += 1;
        let force = JUMP_FORCE * self.jump_mult;
        self.vy = if self.jump_count == 1 {
            force
        } else {
            force * DOUBLE_JUMP_MULTIPLIER
        };
    }
}
