//! Forced-disconnect dispatcher.
//!
//! Every forced close follows the same order: take the connection out of the
//! registry (which cancels its meter), deliver the reason, refresh the admin
//! directory, then close the transport after a short delay so the reason
//! reaches the client first.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use seatmeter_core::types::{ConnectionId, UserId};

use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::directory::DirectoryBroadcaster;
use crate::message::types::OutboundMessage;
use crate::metrics::EngineMetrics;

/// Reason sent to connections evicted by the cap.
pub const REASON_DEVICE_LIMIT: &str = "device limit reached";
/// Reason sent when an administrator disconnects a user.
pub const REASON_ADMIN: &str = "disconnected by administrator";

/// Closes some or all of a user's connections, delivering a reason first.
#[derive(Debug)]
pub struct DisconnectDispatcher {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<DirectoryBroadcaster>,
    metrics: Arc<EngineMetrics>,
    /// Delay between a `forced-disconnect` and the transport close.
    disconnect_delay: Duration,
    /// Delay between an `allowance-exhausted` and the transport close.
    exhausted_grace: Duration,
}

impl DisconnectDispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<DirectoryBroadcaster>,
        metrics: Arc<EngineMetrics>,
        disconnect_delay: Duration,
        exhausted_grace: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            metrics,
            disconnect_delay,
            exhausted_grace,
        }
    }

    /// Disconnects one connection. Returns `false` if it was not live.
    pub async fn disconnect_one(&self, conn_id: &ConnectionId, reason: &str) -> bool {
        let Some(removed) = self.registry.remove(conn_id) else {
            debug!(conn_id = %conn_id, "Disconnect requested for unknown connection");
            return false;
        };

        info!(conn_id = %conn_id, user_id = %removed.handle.user_id, reason, "Forcing disconnect");
        EngineMetrics::inc(&self.metrics.forced_disconnects);
        self.deliver_and_close(
            vec![removed.handle],
            OutboundMessage::forced_disconnect(reason),
            self.disconnect_delay,
        );
        self.broadcaster.publish().await;
        true
    }

    /// Disconnects every live connection of a user. Returns how many.
    pub async fn disconnect_all_for_user(&self, user_id: &UserId, reason: &str) -> usize {
        let handles = self.registry.remove_all_for(user_id);
        if handles.is_empty() {
            return 0;
        }

        let count = handles.len();
        info!(user_id = %user_id, count, reason, "Forcing disconnect of all user connections");
        EngineMetrics::add(&self.metrics.forced_disconnects, count as u64);
        self.deliver_and_close(
            handles,
            OutboundMessage::forced_disconnect(reason),
            self.disconnect_delay,
        );
        self.broadcaster.publish().await;
        count
    }

    /// Tells every live connection of a user that the allowance ran out and
    /// closes them after the grace delay. Returns how many.
    pub async fn exhaust_user(&self, user_id: &UserId, message: &str) -> usize {
        let handles = self.registry.remove_all_for(user_id);
        if handles.is_empty() {
            return 0;
        }

        let count = handles.len();
        info!(user_id = %user_id, count, "Allowance exhausted, closing user connections");
        EngineMetrics::add(&self.metrics.exhaustions, count as u64);
        self.deliver_and_close(handles, OutboundMessage::exhausted(message), self.exhausted_grace);
        self.broadcaster.publish().await;
        count
    }

    /// Exhausts a single connection, leaving the user's others untouched.
    pub async fn exhaust_connection(&self, handle: &Arc<ConnectionHandle>, message: &str) {
        let removed = self.registry.remove(&handle.id).is_some();
        EngineMetrics::inc(&self.metrics.exhaustions);
        self.deliver_and_close(
            vec![Arc::clone(handle)],
            OutboundMessage::exhausted(message),
            self.exhausted_grace,
        );
        if removed {
            self.broadcaster.publish().await;
        }
    }

    /// Notifies connections the registry already evicted.
    pub fn evict(&self, handles: Vec<Arc<ConnectionHandle>>, reason: &str) {
        if handles.is_empty() {
            return;
        }
        EngineMetrics::add(&self.metrics.evictions, handles.len() as u64);
        self.deliver_and_close(
            handles,
            OutboundMessage::forced_disconnect(reason),
            self.disconnect_delay,
        );
    }

    fn deliver_and_close(
        &self,
        handles: Vec<Arc<ConnectionHandle>>,
        message: OutboundMessage,
        delay: Duration,
    ) {
        for handle in &handles {
            if !handle.send(message.clone()) {
                debug!(conn_id = %handle.id, kind = message.kind(), "Reason not delivered");
            }
        }

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for handle in handles {
                handle.close();
            }
        });
    }
}
