//! Session directory adapter: records which address each user connects from.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use seatmeter_core::config::SessionConfig;
use seatmeter_core::traits::SessionDirectory;
use seatmeter_core::types::{ClientInfo, UserId};

const IPV4_MAPPED_PREFIX: &str = "::ffff:";
const UNKNOWN_ADDRESS: &str = "unknown";

/// Writes one session row per `(user, address)` on every admission.
#[derive(Clone)]
pub struct SessionLog {
    directory: Arc<dyn SessionDirectory>,
    max_user_agent_len: usize,
    trust_forwarded_for: bool,
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("max_user_agent_len", &self.max_user_agent_len)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

impl SessionLog {
    /// Creates a new adapter over `directory`.
    pub fn new(directory: Arc<dyn SessionDirectory>, config: &SessionConfig) -> Self {
        Self {
            directory,
            max_user_agent_len: config.max_user_agent_len,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Builds the client facts for a new connection from transport data.
    pub fn client_info(
        &self,
        peer: Option<&str>,
        forwarded_for: Option<&str>,
        user_agent: Option<&str>,
    ) -> ClientInfo {
        let forwarded = forwarded_for.filter(|_| self.trust_forwarded_for);
        ClientInfo {
            network_address: client_address(peer, forwarded),
            user_agent: truncate_user_agent(user_agent, self.max_user_agent_len),
        }
    }

    /// Upserts the session row. Failures are logged and never block admission.
    pub async fn record(&self, user_id: &UserId, client: &ClientInfo) {
        let address = normalize_address(&client.network_address);
        let agent = truncate_user_agent(client.user_agent.as_deref(), self.max_user_agent_len);

        if let Err(e) = self
            .directory
            .upsert(user_id, &address, agent.as_deref(), Utc::now())
            .await
        {
            warn!(
                user_id = %user_id,
                address = %address,
                error = %e,
                "Session directory upsert failed"
            );
        }
    }
}

/// Strips the IPv4-mapped IPv6 prefix and surrounding whitespace.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let address = trimmed.strip_prefix(IPV4_MAPPED_PREFIX).unwrap_or(trimmed);
    if address.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        address.to_string()
    }
}

/// Picks the client address: the first `X-Forwarded-For` hop when present,
/// otherwise the transport peer.
pub fn client_address(peer: Option<&str>, forwarded_for: Option<&str>) -> String {
    let forwarded = forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    normalize_address(forwarded.or(peer).unwrap_or_default())
}

/// Truncates a user agent to at most `max_len` bytes on a char boundary.
pub fn truncate_user_agent(user_agent: Option<&str>, max_len: usize) -> Option<String> {
    let agent = user_agent.map(str::trim).filter(|a| !a.is_empty())?;
    if agent.len() <= max_len {
        return Some(agent.to_string());
    }
    let mut end = max_len;
    while !agent.is_char_boundary(end) {
        end -= 1;
    }
    Some(agent[..end].to_string())
}
