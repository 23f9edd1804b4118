//! Verified caller identity.

use serde::{Deserialize, Serialize};

use crate::types::id::UserId;

/// Identity returned by the identity resolver for a valid credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account the credential belongs to.
    pub user_id: UserId,
    /// Whether the account holds the admin role.
    pub is_admin: bool,
    /// Display name, shown in the admin directory.
    pub name: String,
    /// Contact email, shown in the admin directory.
    pub email: String,
}

/// Transport-level facts about an incoming connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote network address as reported by the transport or a proxy header.
    pub network_address: String,
    /// `User-Agent` header, if any.
    pub user_agent: Option<String>,
}
