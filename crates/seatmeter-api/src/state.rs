//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use seatmeter_core::config::AppConfig;
use seatmeter_realtime::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Real-time engine
    pub engine: Arc<RealtimeEngine>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates the state over a running engine.
    pub fn new(config: Arc<AppConfig>, engine: Arc<RealtimeEngine>) -> Self {
        Self {
            config,
            engine,
            started_at: Instant::now(),
        }
    }
}
