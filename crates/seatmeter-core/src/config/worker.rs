//! Background sweeper configuration.

use serde::{Deserialize, Serialize};

/// Cron-scheduled sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the sweeps are scheduled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (with seconds) for the stale session sweep.
    #[serde(default = "default_session_sweep_cron")]
    pub session_sweep_cron: String,
    /// Cron expression (with seconds) for the allowance status sweep.
    #[serde(default = "default_allowance_sweep_cron")]
    pub allowance_sweep_cron: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_sweep_cron: default_session_sweep_cron(),
            allowance_sweep_cron: default_allowance_sweep_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_session_sweep_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_allowance_sweep_cron() -> String {
    "0 */15 * * * *".to_string()
}
