//! Point-in-time telemetry copy.

use std::fmt;
use std::time::Duration;

/// Plain copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub specs_submitted: u64,
    pub specs_deduplicated: u64,
    pub fetches_started: u64,
    pub tiles_completed: u64,
    pub tiles_failed: u64,
    pub worker_panics: u64,
    pub tiles_evicted: u64,
    pub submissions_coalesced: u64,
}

impl TelemetrySnapshot {
    /// Fraction of finished fetches that produced a tile, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        let finished = self.tiles_completed + self.tiles_failed;
        if finished == 0 {
            return 1.0;
        }
        self.tiles_completed as f64 / finished as f64
    }

    /// Completed tiles per second since the pipeline started.
    pub fn tiles_per_second(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.tiles_completed as f64 / secs
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime:              {:.1}s", self.uptime.as_secs_f64())?;
        writeln!(f, "Specs submitted:     {}", self.specs_submitted)?;
        writeln!(f, "  deduplicated:      {}", self.specs_deduplicated)?;
        writeln!(f, "  coalesced:         {}", self.submissions_coalesced)?;
        writeln!(f, "Fetches started:     {}", self.fetches_started)?;
        writeln!(
            f,
            "Tiles completed:     {} ({:.1}% success, {:.1}/s)",
            self.tiles_completed,
            self.success_rate() * 100.0,
            self.tiles_per_second()
        )?;
        writeln!(f, "Tiles failed:        {}", self.tiles_failed)?;
        writeln!(f, "Worker panics:       {}", self.worker_panics)?;
        write!(f, "Tiles evicted:       {}", self.tiles_evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_without_fetches() {
        assert_eq!(TelemetrySnapshot::default().success_rate(), 1.0);
    }

    #[test]
    fn test_success_rate() {
        let snapshot = TelemetrySnapshot {
            tiles_completed: 3,
            tiles_failed: 1,
            ..Default::default()
        };
        assert!((snapshot.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_lists_counters() {
        let snapshot = TelemetrySnapshot {
            tiles_completed: 12,
            worker_panics: 2,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.contains("Tiles completed:     12"));
        assert!(text.contains("Worker panics:       2"));
    }
}
