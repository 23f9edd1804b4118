//! Individual live connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use seatmeter_core::types::{ClientInfo, ConnectionId, Identity, UserId};

use crate::message::types::{DirectoryEntry, OutboundMessage, PageView};

/// A handle to a single live connection.
///
/// Holds the sender channel for pushing messages to the client, the close
/// signal watched by the transport task, and the identity facts needed for
/// admission and the admin directory.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID, fresh for every admission.
    pub id: ConnectionId,
    /// User who owns this connection.
    pub user_id: UserId,
    /// Whether the owner is an administrator.
    pub is_admin: bool,
    /// Display name (cached for the directory).
    pub name: String,
    /// Contact email (cached for the directory).
    pub email: String,
    /// Normalised remote address.
    pub network_address: String,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// When the connection was admitted.
    pub connected_at: DateTime<Utc>,
    /// Page the client last reported.
    current_page: RwLock<Option<PageView>>,
    /// Sender for outbound messages.
    sender: mpsc::Sender<OutboundMessage>,
    /// Cleared once the connection is closed or its receiver is gone.
    alive: AtomicBool,
    /// Fired to make the transport task close the socket.
    close: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle.
    pub fn new(
        identity: &Identity,
        client: &ClientInfo,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id: identity.user_id,
            is_admin: identity.is_admin,
            name: identity.name.clone(),
            email: identity.email.clone(),
            network_address: client.network_address.clone(),
            user_agent: client.user_agent.clone(),
            connected_at: Utc::now(),
            current_page: RwLock::new(None),
            sender,
            alive: AtomicBool::new(true),
            close: CancellationToken::new(),
        }
    }

    /// Queue an outbound message. Returns `false` if it was not queued.
    pub fn send(&self, msg: OutboundMessage) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(
                    conn_id = %self.id,
                    kind = msg.kind(),
                    "Connection send buffer full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if the connection is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the connection as dead without signalling the transport.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Stop accepting messages and signal the transport to close. Idempotent.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(conn_id = %self.id, user_id = %self.user_id, "Closing connection");
        }
        self.close.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// A token that fires when the connection is closed.
    pub fn close_signal(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Record the page the client navigated to.
    pub async fn set_page(&self, page: PageView) {
        *self.current_page.write().await = Some(page);
    }

    /// Clear the current page.
    pub async fn clear_page(&self) {
        *self.current_page.write().await = None;
    }

    /// The page the client last reported.
    pub async fn current_page(&self) -> Option<PageView> {
        self.current_page.read().await.clone()
    }

    /// Redacted directory view of this connection.
    pub async fn directory_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            connection_id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            is_admin: self.is_admin,
            connected_at: self.connected_at,
            current_page: self.current_page().await,
        }
    }
}
