//! Time utilities for game simulation

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

/// Seconds between two instants as a simulation delta.
/// Large gaps are capped so a stalled room does not teleport.
pub fn step_delta(last: Instant, now: Instant) -> f32 {
    now.saturating_duration_since(last).as_secs_f32().min(MAX_STEP_SECS)
}

/// Upper bound on a single simulation step
pub const MAX_STEP_SECS: f32 = 0.25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_delta_capped() {
        let start = Instant::now();
        assert_eq!(step_delta(start, start), 0.0);
        assert_eq!(step_delta(start, start + Duration::from_secs(3)), MAX_STEP_SECS);
        // clock going backwards is treated as no time passing
        assert_eq!(step_delta(start + Duration::from_secs(1), start), 0.0);
    }

    #[test]
    fn test_unix_millis_monotone_enough() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
    }
}
