//! Real-time connection engine configuration.

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound message buffer per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Delay between delivering a `forced-disconnect` reason and closing
    /// the transport, in milliseconds.
    #[serde(default = "default_disconnect_delay")]
    pub disconnect_delay_ms: u64,
    /// Cap applied when neither an override nor a plan cap is stored.
    #[serde(default = "default_cap")]
    pub default_cap: u32,
    /// Maximum accepted length of page path/title/referrer fields.
    #[serde(default = "default_max_page_field_len")]
    pub max_page_field_len: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
            disconnect_delay_ms: default_disconnect_delay(),
            default_cap: default_cap(),
            max_page_field_len: default_max_page_field_len(),
        }
    }
}

fn default_channel_buffer() -> usize {
    64
}

fn default_disconnect_delay() -> u64 {
    250
}

fn default_cap() -> u32 {
    1
}

fn default_max_page_field_len() -> usize {
    512
}
