//! Admission controller: enforces the per-user connection cap.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use seatmeter_auth::CapResolver;
use seatmeter_core::types::{ClientInfo, ConnectionId, Identity};

use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::control::DisconnectDispatcher;
use crate::control::dispatcher::REASON_DEVICE_LIMIT;
use crate::message::types::OutboundMessage;
use crate::metrics::EngineMetrics;

use super::session_log::SessionLog;

/// Outcome of a successful admission.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The newly registered connection.
    pub connection: Arc<ConnectionHandle>,
    /// Connections evicted to make room, oldest first.
    pub evicted: Vec<ConnectionId>,
}

/// Decides whether a verified identity may open one more connection.
#[derive(Debug)]
pub struct AdmissionController {
    caps: CapResolver,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<DisconnectDispatcher>,
    sessions: SessionLog,
    metrics: Arc<EngineMetrics>,
}

impl AdmissionController {
    /// Creates a new admission controller.
    pub fn new(
        caps: CapResolver,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<DisconnectDispatcher>,
        sessions: SessionLog,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            caps,
            registry,
            dispatcher,
            sessions,
            metrics,
        }
    }

    /// Admits a connection for `identity`.
    ///
    /// The cap is resolved first (a lookup failure yields the most
    /// restrictive cap). Eviction of the oldest connections and registration
    /// of the new one then happen as one step, so the user never holds more
    /// than `cap` live connections.
    pub async fn admit(
        &self,
        identity: &Identity,
        client: &ClientInfo,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Admission {
        let cap = self.caps.resolve(identity).await;
        let connection = Arc::new(ConnectionHandle::new(identity, client, sender));

        let evicted = self.registry.admit(Arc::clone(&connection), cap);
        let evicted_ids: Vec<ConnectionId> = evicted.iter().map(|h| h.id).collect();
        for id in &evicted_ids {
            info!(
                user_id = %identity.user_id,
                evicted = %id,
                admitted = %connection.id,
                cap = %cap,
                "Evicting oldest connection"
            );
        }
        self.dispatcher.evict(evicted, REASON_DEVICE_LIMIT);

        EngineMetrics::inc(&self.metrics.connections_admitted);
        info!(
            conn_id = %connection.id,
            user_id = %identity.user_id,
            is_admin = identity.is_admin,
            cap = %cap,
            "Connection admitted"
        );

        self.sessions.record(&identity.user_id, client).await;

        Admission {
            connection,
            evicted: evicted_ids,
        }
    }

    /// The session directory adapter used on admission.
    pub fn sessions(&self) -> &SessionLog {
        &self.sessions
    }
}
