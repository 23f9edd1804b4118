//! Session directory trait for the durable per-address activity log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::id::UserId;

/// One row of the session directory, keyed by `(user_id, network_address)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Owning user.
    pub user_id: UserId,
    /// Normalised remote address.
    pub network_address: String,
    /// Last seen user agent.
    pub user_agent: Option<String>,
    /// Last admission from this address.
    pub last_activity_at: DateTime<Utc>,
    /// First admission from this address.
    pub created_at: DateTime<Utc>,
}

/// Durable activity log with upsert semantics.
#[async_trait]
pub trait SessionDirectory: Send + Sync + 'static {
    /// Create the row for `(user_id, network_address)` or refresh its
    /// `last_activity_at` and `user_agent`.
    async fn upsert(
        &self,
        user_id: &UserId,
        network_address: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// List all rows for a user, most recent first.
    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<SessionRecord>>;

    /// Delete rows whose `last_activity_at` is before `cutoff`.
    ///
    /// Returns the number of rows removed.
    async fn sweep_inactive(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
