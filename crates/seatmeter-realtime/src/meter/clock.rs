//! Wall-clock readings for the usage meter.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Wall clock anchored to the tokio clock.
///
/// Readings advance with `tokio::time`, so a paused runtime moves meter
/// ticks and elapsed allowance time together.
#[derive(Debug, Clone, Copy)]
pub struct MeterClock {
    origin_utc: DateTime<Utc>,
    origin_instant: Instant,
}

impl MeterClock {
    /// Anchor a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin_utc: Utc::now(),
            origin_instant: Instant::now(),
        }
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.origin_instant.elapsed())
            .ok()
            .and_then(|elapsed| self.origin_utc.checked_add_signed(elapsed))
            .unwrap_or(self.origin_utc)
    }
}

impl Default for MeterClock {
    fn default() -> Self {
        Self::new()
    }
}
