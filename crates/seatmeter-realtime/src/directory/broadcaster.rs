//! Live-connection directory delivered to admin connections.

use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::message::types::{DirectoryEntry, OutboundMessage};
use crate::metrics::EngineMetrics;

/// Publishes redacted snapshots of the registry to every admin connection.
#[derive(Debug)]
pub struct DirectoryBroadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<EngineMetrics>,
}

impl DirectoryBroadcaster {
    /// Creates a new broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<EngineMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Redacted view of every live connection, ordered by admission time.
    pub async fn snapshot(&self) -> Vec<DirectoryEntry> {
        join_all(
            self.registry
                .list_all()
                .into_iter()
                .map(|handle| async move { handle.directory_entry().await }),
        )
        .await
    }

    /// Delivers the current snapshot to all admin connections.
    ///
    /// A recipient whose queue rejects the message is skipped. Returns the
    /// number of admins reached.
    pub async fn publish(&self) -> usize {
        let admins = self.registry.all_admins();
        if admins.is_empty() {
            return 0;
        }

        let message = OutboundMessage::DirectorySnapshot {
            connections: self.snapshot().await,
        };

        let mut delivered = 0;
        for admin in &admins {
            if admin.send(message.clone()) {
                delivered += 1;
            } else {
                debug!(conn_id = %admin.id, "Skipping admin that did not accept directory snapshot");
            }
        }

        EngineMetrics::add(&self.metrics.directory_deliveries, delivered as u64);
        delivered
    }

    /// Sends a one-shot snapshot to a single connection.
    pub async fn send_to(&self, handle: &ConnectionHandle) -> bool {
        let message = OutboundMessage::DirectorySnapshot {
            connections: self.snapshot().await,
        };
        let sent = handle.send(message);
        if sent {
            EngineMetrics::inc(&self.metrics.directory_deliveries);
        }
        sent
    }
}
