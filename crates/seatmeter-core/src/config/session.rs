//! Session directory configuration.

use serde::{Deserialize, Serialize};

/// Durable session log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Rows idle for longer than this many hours are purged by the sweep.
    #[serde(default = "default_inactivity_hours")]
    pub inactivity_hours: u64,
    /// Maximum stored length of a user agent string.
    #[serde(default = "default_max_user_agent_len")]
    pub max_user_agent_len: usize,
    /// Trust the first `X-Forwarded-For` entry as the client address.
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_hours: default_inactivity_hours(),
            max_user_agent_len: default_max_user_agent_len(),
            trust_forwarded_for: true,
        }
    }
}

fn default_inactivity_hours() -> u64 {
    24
}

fn default_max_user_agent_len() -> usize {
    512
}

fn default_true() -> bool {
    true
}
