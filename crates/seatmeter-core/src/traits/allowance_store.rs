//! Allowance store trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::allowance::Allowance;
use crate::types::id::UserId;

/// Durable storage of per-user allowance records.
///
/// Callers serialize read-modify-write cycles per user; implementations only
/// need to make individual calls atomic.
#[async_trait]
pub trait AllowanceStore: Send + Sync + 'static {
    /// Load the allowance for a user, `None` if the user has never had a plan.
    async fn get(&self, user_id: &UserId) -> AppResult<Option<Allowance>>;

    /// Insert or replace the allowance record.
    async fn save(&self, allowance: &Allowance) -> AppResult<()>;

    /// List allowances whose status can still change on its own
    /// (`active` and `expiring_soon`).
    async fn list_sweepable(&self) -> AppResult<Vec<Allowance>>;
}
