//! Engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Connections admitted
    pub connections_admitted: AtomicU64,
    /// Connections closed for any reason
    pub connections_closed: AtomicU64,
    /// Connections evicted by the cap
    pub evictions: AtomicU64,
    /// Connections closed by a forced disconnect
    pub forced_disconnects: AtomicU64,
    /// Connections closed because the allowance ran out
    pub exhaustions: AtomicU64,
    /// Meter ticks processed
    pub meter_ticks: AtomicU64,
    /// Allowance writes that failed
    pub allowance_write_failures: AtomicU64,
    /// Directory snapshots delivered
    pub directory_deliveries: AtomicU64,
    /// Inbound messages received
    pub messages_received: AtomicU64,
}

impl EngineMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to a counter
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter
    pub fn inc(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_admitted: self.connections_admitted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            forced_disconnects: self.forced_disconnects.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
            meter_ticks: self.meter_ticks.load(Ordering::Relaxed),
            allowance_write_failures: self.allowance_write_failures.load(Ordering::Relaxed),
            directory_deliveries: self.directory_deliveries.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connections admitted
    pub connections_admitted: u64,
    /// Connections closed
    pub connections_closed: u64,
    /// Cap evictions
    pub evictions: u64,
    /// Forced disconnects
    pub forced_disconnects: u64,
    /// Exhaustion closes
    pub exhaustions: u64,
    /// Meter ticks
    pub meter_ticks: u64,
    /// Failed allowance writes
    pub allowance_write_failures: u64,
    /// Directory snapshots delivered
    pub directory_deliveries: u64,
    /// Inbound messages
    pub messages_received: u64,
}
