//! Stale session row purge.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing;

use seatmeter_core::config::SessionConfig;
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::SessionDirectory;

/// Deletes session rows that have seen no admission within the inactivity window.
pub struct SessionSweep {
    /// Session directory
    directory: Arc<dyn SessionDirectory>,
    /// Rows older than this are purged
    inactivity: Duration,
}

impl std::fmt::Debug for SessionSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSweep")
            .field("inactivity", &self.inactivity)
            .finish()
    }
}

impl SessionSweep {
    /// Create a new session sweep
    pub fn new(directory: Arc<dyn SessionDirectory>, config: &SessionConfig) -> Self {
        let hours = i64::try_from(config.inactivity_hours).unwrap_or(24);
        Self {
            directory,
            inactivity: Duration::hours(hours),
        }
    }

    /// Purge rows whose last activity is older than the inactivity window
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - self.inactivity;
        let removed = self.directory.sweep_inactive(cutoff).await?;
        if removed > 0 {
            tracing::info!("Purged {} inactive session rows (cutoff {})", removed, cutoff);
        } else {
            tracing::debug!("No inactive session rows before {}", cutoff);
        }
        Ok(removed)
    }
}
