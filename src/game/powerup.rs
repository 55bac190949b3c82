//! Power-up spawning, pickup, and per-player effect state.
//!
//! All timing is tick-deadline based and advanced from the match task, so an
//! entity disappearing (player leaves, power-up collected) implicitly
//! cancels its pending expiry.

use rand::Rng;
use uuid::Uuid;

use super::tuning::{
    ARENA_HALF_DEPTH, ARENA_HALF_WIDTH, POWERUP_EFFECT_TICKS, POWERUP_LIFETIME_TICKS,
    POWERUP_MAX_ACTIVE, POWERUP_PICKUP_RANGE, POWERUP_SPAWN_INTERVAL_TICKS, POWERUP_SPAWN_Y,
    SPEED_MULT_MAX, SPEED_RAMP_DOWN_STEPS, SPEED_RAMP_DOWN_TICKS, SPEED_RAMP_UP_STEPS,
    SPEED_RAMP_UP_TICKS,
};
use crate::ws::protocol::PowerUpKind;

/// Margin keeping spawns away from the walls
const SPAWN_MARGIN: f32 = 1.5;

/// A power-up waiting on the pitch
#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: Uuid,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub spawned_tick: u64,
}

/// Spawner + ground inventory for one match
#[derive(Debug)]
pub struct PowerUpService {
    items: Vec<PowerUp>,
    next_spawn_tick: u64,
}

impl PowerUpService {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_spawn_tick: POWERUP_SPAWN_INTERVAL_TICKS,
        }
    }

    pub fn items(&self) -> &[PowerUp] {
        &self.items
    }

    /// Advance the spawner one tick. Returns the newly spawned power-up (if
    /// any) and the ids that timed out on the ground.
    pub fn tick<R: Rng>(&mut self, tick: u64, rng: &mut R) -> (Option<PowerUp>, Vec<Uuid>) {
        let mut expired = Vec::new();
        self.items.retain(|item| {
            if tick.saturating_sub(item.spawned_tick) >= POWERUP_LIFETIME_TICKS {
                expired.push(item.id);
                false
            } else {
                true
            }
        });

        let mut spawned = None;
        if tick >= self.next_spawn_tick {
            self.next_spawn_tick = tick + POWERUP_SPAWN_INTERVAL_TICKS;
            if self.items.len() < POWERUP_MAX_ACTIVE {
                let kind = PowerUpKind::ALL[rng.gen_range(0..PowerUpKind::ALL.len())];
                let item = PowerUp {
                    id: Uuid::new_v4(),
                    kind,
                    x: rng.gen_range(-(ARENA_HALF_WIDTH - SPAWN_MARGIN)..=(ARENA_HALF_WIDTH - SPAWN_MARGIN)),
                    y: POWERUP_SPAWN_Y,
                    z: rng.gen_range(-(ARENA_HALF_DEPTH - SPAWN_MARGIN)..=(ARENA_HALF_DEPTH - SPAWN_MARGIN)),
                    spawned_tick: tick,
                };
                self.items.push(item.clone());
                spawned = Some(item);
            }
        }

        (spawned, expired)
    }

    /// Collect the first power-up within horizontal pickup range of (x, z)
    pub fn try_collect(&mut self, x: f32, z: f32) -> Option<PowerUp> {
        let idx = self.items.iter().position(|item| {
            let dx = item.x - x;
            let dz = item.z - z;
            (dx * dx + dz * dz).sqrt() < POWERUP_PICKUP_RANGE
        })?;
        Some(self.items.remove(idx))
    }
}

impl Default for PowerUpService {
    fn default() -> Self {
        Self::new()
    }
}

/// Active effect deadlines on one player. An effect being `Some` means it is
/// live; `advance` clears deadlines as they pass. Re-applying a kind
/// overwrites its deadline (last-write-wins).
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectState {
    pub speed_started: Option<u64>,
    pub jump_until: Option<u64>,
    pub kick_until: Option<u64>,
    pub invisible_until: Option<u64>,
    pub giant_until: Option<u64>,
}

/// Effects whose window closed this tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredEffects {
    pub speed: bool,
    pub jump: bool,
    pub kick: bool,
    pub invisible: bool,
    pub giant: bool,
}

impl EffectState {
    pub fn apply(&mut self, kind: PowerUpKind, tick: u64) {
        let until = tick + POWERUP_EFFECT_TICKS;
        match kind {
            PowerUpKind::Speed => self.speed_started = Some(tick),
            PowerUpKind::Jump => self.jump_until = Some(until),
            PowerUpKind::Kick => self.kick_until = Some(until),
            PowerUpKind::Invisible => self.invisible_until = Some(until),
            PowerUpKind::Giant => self.giant_until = Some(until),
        }
    }

    pub fn giant_active(&self) -> bool {
        self.giant_until.is_some()
    }

    pub fn jump_active(&self) -> bool {
        self.jump_until.is_some()
    }

    pub fn kick_active(&self) -> bool {
        self.kick_until.is_some()
    }

    /// Clear effects whose deadline passed, reporting which ended
    pub fn advance(&mut self, tick: u64) -> ExpiredEffects {
        let mut expired = ExpiredEffects::default();

        if let Some(start) = self.speed_started {
            if tick.saturating_sub(start) >= POWERUP_EFFECT_TICKS {
                self.speed_started = None;
                expired.speed = true;
            }
        }
        let mut check = |slot: &mut Option<u64>, flag: &mut bool| {
            if let Some(until) = *slot {
                if tick >= until {
                    *slot = None;
                    *flag = true;
                }
            }
        };
        check(&mut self.jump_until, &mut expired.jump);
        check(&mut self.kick_until, &mut expired.kick);
        check(&mut self.invisible_until, &mut expired.invisible);
        check(&mut self.giant_until, &mut expired.giant);

        expired
    }

    /// Speed multiplier at the given tick: a quantized ramp up over the
    /// first 500 ms, a hold at the max, and a quantized ramp down through
    /// the final second of the window.
    pub fn speed_mult(&self, tick: u64) -> f32 {
        let Some(start) = self.speed_started else {
            return 1.0;
        };
        let elapsed = tick.saturating_sub(start);
        if elapsed >= POWERUP_EFFECT_TICKS {
            return 1.0;
        }

        let gain = SPEED_MULT_MAX - 1.0;
        if elapsed < SPEED_RAMP_UP_TICKS {
            let step = elapsed / (SPEED_RAMP_UP_TICKS / SPEED_RAMP_UP_STEPS);
            return 1.0 + gain * step as f32 / SPEED_RAMP_UP_STEPS as f32;
        }

        let down_start = POWERUP_EFFECT_TICKS - SPEED_RAMP_DOWN_TICKS;
        if elapsed >= down_start {
            let step = (elapsed - down_start) / (SPEED_RAMP_DOWN_TICKS / SPEED_RAMP_DOWN_STEPS);
            return SPEED_MULT_MAX - gain * step as f32 / SPEED_RAMP_DOWN_STEPS as f32;
        }

        SPEED_MULT_MAX
    }
}
