//! Time utilities for the simulation and wall-clock bookkeeping

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Simulation cadence. Every step consumes the fixed dt regardless of
/// wall-clock drift; snapshots go out every other tick.
pub const SIMULATION_TPS: u32 = 60;
pub const SNAPSHOT_TPS: u32 = 30;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Fixed timestep for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Convert a duration in seconds to a tick count
pub const fn secs_to_ticks(secs: u64) -> u64 {
    secs * SIMULATION_TPS as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_rate_divides_tick_rate() {
        assert_eq!(SIMULATION_TPS % SNAPSHOT_TPS, 0);
        assert_eq!(SIMULATION_TPS / SNAPSHOT_TPS, 2);
    }

    #[test]
    fn tick_conversion() {
        assert_eq!(secs_to_ticks(15), 900);
        assert_eq!(secs_to_ticks(20), 1200);
    }
}
