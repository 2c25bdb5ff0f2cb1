//! Snapshot pacing

/// Decides when a running room should broadcast its next snapshot
#[derive(Debug, Clone)]
pub struct SnapshotPacer {
    /// Seconds accumulated since the last snapshot
    accum: f32,
    /// Snapshot interval in seconds
    interval: f32,
}

impl SnapshotPacer {
    pub fn new(rate_hz: f32) -> Self {
        let interval = if rate_hz > 0.0 { 1.0 / rate_hz } else { f32::MAX };
        Self {
            accum: 0.0,
            interval,
        }
    }

    /// Record `dt` seconds and check whether a snapshot is due
    pub fn should_send(&mut self, dt: f32) -> bool {
        self.accum += dt;
        if self.accum >= self.interval {
            self.accum = 0.0;
            true
        } else {
            false
        }
    }

    /// Force a snapshot on the next check (used for important events)
    pub fn force_next(&mut self) {
        self.accum = self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_interval() {
        let mut pacer = SnapshotPacer::new(4.0);
        assert!(!pacer.should_send(0.1));
        assert!(!pacer.should_send(0.1));
        assert!(pacer.should_send(0.1));
        assert!(!pacer.should_send(0.1));
    }

    #[test]
    fn test_force_next() {
        let mut pacer = SnapshotPacer::new(1.0);
        pacer.force_next();
        assert!(pacer.should_send(0.0));
    }
}
