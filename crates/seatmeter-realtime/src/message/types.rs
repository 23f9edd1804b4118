//! Inbound and outbound WebSocket message type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seatmeter_core::types::{AllowanceSnapshot, ConnectionId, UserId};

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    /// One-shot directory request (admin only).
    GetDirectory,
    /// Close every connection of a user (admin only).
    ForceDisconnect {
        /// Target user.
        user_id: UserId,
    },
    /// The client navigated to a page.
    PageEnter {
        /// Page path.
        path: String,
        /// Page title.
        #[serde(default)]
        title: Option<String>,
        /// Referring page.
        #[serde(default)]
        referrer: Option<String>,
    },
    /// The client left its current page.
    PageLeave,
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Live connection list, delivered to admins.
    DirectorySnapshot {
        /// Redacted connection views.
        connections: Vec<DirectoryEntry>,
    },
    /// Current allowance state.
    AllowanceUpdated(AllowanceSnapshot),
    /// The allowance ran out; the connection closes after a grace delay.
    AllowanceExhausted {
        /// Human-readable reason.
        message: String,
        /// Always `0`.
        remaining: f64,
    },
    /// The server is about to close the connection.
    ForcedDisconnect {
        /// Why the connection is being closed.
        reason: String,
    },
    /// Malformed or unauthorized request.
    Error {
        /// Machine-readable code.
        code: String,
        /// Description.
        message: String,
    },
}

impl OutboundMessage {
    /// Build a `forced-disconnect` message.
    pub fn forced_disconnect(reason: impl Into<String>) -> Self {
        Self::ForcedDisconnect {
            reason: reason.into(),
        }
    }

    /// Build an `allowance-exhausted` message.
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::AllowanceExhausted {
            message: message.into(),
            remaining: 0.0,
        }
    }

    /// Build an `error` message.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectorySnapshot { .. } => "directory-snapshot",
            Self::AllowanceUpdated(_) => "allowance-updated",
            Self::AllowanceExhausted { .. } => "allowance-exhausted",
            Self::ForcedDisconnect { .. } => "forced-disconnect",
            Self::Error { .. } => "error",
        }
    }
}

/// The page a connection is currently viewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    /// Page path.
    pub path: String,
    /// Page title.
    pub title: Option<String>,
    /// Referring page.
    pub referrer: Option<String>,
    /// When the page was entered.
    pub entered_at: DateTime<Utc>,
}

/// Redacted view of one live connection, as shown to admins.
///
/// Network address and user agent are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Connection ID.
    pub connection_id: ConnectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Whether the owner is an administrator.
    pub is_admin: bool,
    /// Admission time.
    pub connected_at: DateTime<Utc>,
    /// Current page, if any.
    pub current_page: Option<PageView>,
}
