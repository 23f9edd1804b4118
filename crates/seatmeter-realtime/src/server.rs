//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use seatmeter_auth::CapResolver;
use seatmeter_core::config::AppConfig;
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::{AccountStore, AllowanceStore, IdentityResolver, SessionDirectory};
use seatmeter_core::types::{ClientInfo, ConnectionId, Identity};

use crate::admission::{AdmissionController, SessionLog};
use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::control::dispatcher::REASON_ADMIN;
use crate::control::{DisconnectDispatcher, SubscriptionControl};
use crate::directory::DirectoryBroadcaster;
use crate::message::types::{InboundMessage, OutboundMessage, PageView};
use crate::message::validator;
use crate::meter::{AllowanceLanes, MeterClock, MeterStart, UsageMeter};
use crate::metrics::EngineMetrics;

/// External collaborators the engine is built over.
#[derive(Clone)]
pub struct EngineStores {
    /// Credential verification.
    pub identity: Arc<dyn IdentityResolver>,
    /// Cap overrides and plan caps.
    pub accounts: Arc<dyn AccountStore>,
    /// Allowance records.
    pub allowances: Arc<dyn AllowanceStore>,
    /// Per-address activity log.
    pub sessions: Arc<dyn SessionDirectory>,
}

/// A freshly admitted connection, ready for the transport task.
#[derive(Debug)]
pub struct Connected {
    /// Registered connection handle.
    pub handle: Arc<ConnectionHandle>,
    /// Outbound messages for the transport to write.
    pub outbound: mpsc::Receiver<OutboundMessage>,
    /// Connections evicted to make room.
    pub evicted: Vec<ConnectionId>,
    /// Result of starting the meter.
    pub meter: MeterStart,
}

/// Live counts for health reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineStats {
    /// Live connections.
    pub connections: usize,
    /// Users with at least one live connection.
    pub users: usize,
    /// Meter tasks still scheduled.
    pub meters: usize,
}

/// Central real-time engine that coordinates admission, metering, the admin
/// directory, and forced disconnects.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Admission controller.
    pub admission: Arc<AdmissionController>,
    /// Usage meter.
    pub meter: Arc<UsageMeter>,
    /// Admin directory broadcaster.
    pub directory: Arc<DirectoryBroadcaster>,
    /// Forced-disconnect dispatcher.
    pub dispatcher: Arc<DisconnectDispatcher>,
    /// Administrative subscription operations.
    pub control: Arc<SubscriptionControl>,
    /// Per-user allowance lanes.
    pub lanes: Arc<AllowanceLanes>,
    /// Metrics collector.
    pub metrics: Arc<EngineMetrics>,
    identity: Arc<dyn IdentityResolver>,
    channel_buffer_size: usize,
    max_page_field_len: usize,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("connections", &self.registry.connection_count())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(config: &AppConfig, stores: EngineStores) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let lanes = Arc::new(AllowanceLanes::new());
        let clock = MeterClock::new();

        let directory = Arc::new(DirectoryBroadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(DisconnectDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            Arc::clone(&metrics),
            std::time::Duration::from_millis(config.realtime.disconnect_delay_ms),
            config.metering.exhausted_grace(),
        ));
        let admission = Arc::new(AdmissionController::new(
            CapResolver::new(Arc::clone(&stores.accounts), &config.realtime),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            SessionLog::new(Arc::clone(&stores.sessions), &config.session),
            Arc::clone(&metrics),
        ));
        let meter = Arc::new(UsageMeter::new(
            Arc::clone(&stores.allowances),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&lanes),
            Arc::clone(&metrics),
            clock,
            config.metering.tick_interval(),
        ));
        let control = Arc::new(SubscriptionControl::new(
            Arc::clone(&stores.allowances),
            Arc::clone(&stores.accounts),
            Arc::clone(&lanes),
            Arc::clone(&dispatcher),
            clock,
        ));

        info!(
            tick_interval_seconds = config.metering.tick_interval_seconds,
            default_cap = config.realtime.default_cap,
            "Real-time engine initialized"
        );

        Self {
            registry,
            admission,
            meter,
            directory,
            dispatcher,
            control,
            lanes,
            metrics,
            identity: stores.identity,
            channel_buffer_size: config.realtime.channel_buffer_size.max(1),
            max_page_field_len: config.realtime.max_page_field_len,
        }
    }

    /// Verifies a connection credential.
    pub async fn authenticate(&self, credential: &str) -> AppResult<Identity> {
        self.identity.verify(credential).await
    }

    /// Verifies `credential` and admits the connection.
    ///
    /// A credential failure returns the error without touching any state.
    pub async fn connect_with_credential(
        &self,
        credential: &str,
        client: ClientInfo,
    ) -> AppResult<Connected> {
        let identity = self.authenticate(credential).await?;
        Ok(self.connect(identity, client).await)
    }

    /// Admits a verified identity: cap enforcement, registration, meter
    /// start, then a directory refresh.
    pub async fn connect(&self, identity: Identity, client: ClientInfo) -> Connected {
        let (tx, outbound) = mpsc::channel(self.channel_buffer_size);
        let admission = self.admission.admit(&identity, &client, tx).await;
        let meter = self.meter.start(&admission.connection).await;
        self.directory.publish().await;

        Connected {
            handle: admission.connection,
            outbound,
            evicted: admission.evicted,
            meter,
        }
    }

    /// Tears down a connection whose transport has ended.
    ///
    /// Safe to call for connections a forced disconnect already removed.
    pub async fn disconnect(&self, handle: &Arc<ConnectionHandle>) {
        self.meter.stop(&handle.id);
        let removed = self.registry.remove(&handle.id);
        handle.close();
        EngineMetrics::inc(&self.metrics.connections_closed);

        if !handle.is_admin {
            self.meter.flush(&handle.user_id).await;
        }

        if let Some(removed) = removed {
            debug!(
                conn_id = %handle.id,
                user_id = %handle.user_id,
                remaining = removed.remaining,
                "Connection closed"
            );
            self.directory.publish().await;
        }
    }

    /// Handles one inbound text frame.
    pub async fn handle_inbound(&self, handle: &Arc<ConnectionHandle>, raw: &str) {
        EngineMetrics::inc(&self.metrics.messages_received);

        if let Err(e) = validator::validate_inbound(raw) {
            handle.send(OutboundMessage::error("INVALID_MESSAGE", e.message));
            return;
        }

        let message: InboundMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                handle.send(OutboundMessage::error(
                    "INVALID_MESSAGE",
                    format!("Failed to parse message: {e}"),
                ));
                return;
            }
        };

        match message {
            InboundMessage::GetDirectory => {
                if !handle.is_admin {
                    Self::forbid(handle, "get-directory");
                    return;
                }
                self.directory.send_to(handle).await;
            }
            InboundMessage::ForceDisconnect { user_id } => {
                if !handle.is_admin {
                    Self::forbid(handle, "force-disconnect");
                    return;
                }
                info!(admin_conn = %handle.id, target = %user_id, "Admin force-disconnect");
                self.dispatcher
                    .disconnect_all_for_user(&user_id, REASON_ADMIN)
                    .await;
            }
            InboundMessage::PageEnter {
                path,
                title,
                referrer,
            } => {
                if let Err(e) = validator::validate_page(
                    &path,
                    title.as_deref(),
                    referrer.as_deref(),
                    self.max_page_field_len,
                ) {
                    handle.send(OutboundMessage::error("VALIDATION", e.message));
                    return;
                }
                handle
                    .set_page(PageView {
                        path,
                        title,
                        referrer,
                        entered_at: Utc::now(),
                    })
                    .await;
                self.directory.publish().await;
            }
            InboundMessage::PageLeave => {
                handle.clear_page().await;
                self.directory.publish().await;
            }
        }
    }

    fn forbid(handle: &ConnectionHandle, action: &str) {
        warn!(conn_id = %handle.id, user_id = %handle.user_id, action, "Non-admin request rejected");
        handle.send(OutboundMessage::error(
            "FORBIDDEN",
            format!("{action} requires an administrator"),
        ));
    }

    /// Live counts for health reporting.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            connections: self.registry.connection_count(),
            users: self.registry.user_count(),
            meters: self.meter.scheduled_count(),
        }
    }

    /// Closes every connection and stops every meter.
    pub async fn shutdown(&self) {
        info!("Shutting down real-time engine");
        let all = self.registry.list_all();
        for handle in &all {
            self.registry.remove(&handle.id);
            handle.close();
        }
        info!(count = all.len(), "All connections closed");
    }
}
