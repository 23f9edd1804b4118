//! Usage meter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Usage meter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Seconds between hours-mode ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Delay between `allowance-exhausted` and closing the connection, in milliseconds.
    #[serde(default = "default_exhausted_grace")]
    pub exhausted_grace_ms: u64,
    /// Days before `window_end` at which a days-mode allowance becomes `expiring_soon`.
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: i64,
}

impl MeteringConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.max(1))
    }

    /// Exhaustion grace delay as a [`Duration`].
    pub fn exhausted_grace(&self) -> Duration {
        Duration::from_millis(self.exhausted_grace_ms)
    }
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
            exhausted_grace_ms: default_exhausted_grace(),
            expiring_soon_days: default_expiring_soon_days(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

fn default_exhausted_grace() -> u64 {
    3000
}

fn default_expiring_soon_days() -> i64 {
    5
}
