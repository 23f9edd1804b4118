//! Account store trait for connection cap lookups.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::connection_cap::CapLookup;
use crate::types::id::UserId;

/// Read access to per-user and per-plan connection caps, plus the
/// administrative override write.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Look up the stored cap values for a user.
    async fn get_cap(&self, user_id: &UserId) -> AppResult<CapLookup>;

    /// Set (`Some`) or clear (`None`) the per-user override.
    async fn set_override(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()>;

    /// Replace the cap carried by the user's plan.
    async fn set_plan_cap(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()>;
}
