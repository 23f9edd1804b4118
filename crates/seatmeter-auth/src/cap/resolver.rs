//! Connection cap resolution: determines how many simultaneous live
//! connections a user may hold.
//!
//! Resolution order:
//! 1. Administrators are unlimited
//! 2. Per-user override from the account store
//! 3. Plan cap from the account store
//! 4. Configured default
//!
//! A failed lookup falls back to [`ConnectionCap::MOST_RESTRICTIVE`].

use std::sync::Arc;

use tracing::warn;

use seatmeter_core::config::RealtimeConfig;
use seatmeter_core::traits::AccountStore;
use seatmeter_core::types::{ConnectionCap, Identity};

/// Resolves connection caps for individual users.
#[derive(Clone)]
pub struct CapResolver {
    /// Store holding per-user overrides and plan caps.
    accounts: Arc<dyn AccountStore>,
    /// Cap applied when neither an override nor a plan cap is set.
    default_cap: u32,
}

impl std::fmt::Debug for CapResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapResolver")
            .field("default_cap", &self.default_cap)
            .finish()
    }
}

impl CapResolver {
    /// Creates a new cap resolver.
    pub fn new(accounts: Arc<dyn AccountStore>, config: &RealtimeConfig) -> Self {
        Self {
            accounts,
            default_cap: config.default_cap,
        }
    }

    /// Resolves the effective cap for `identity`. Never fails.
    pub async fn resolve(&self, identity: &Identity) -> ConnectionCap {
        if identity.is_admin {
            return ConnectionCap::Unlimited;
        }

        match self.accounts.get_cap(&identity.user_id).await {
            Ok(lookup) => ConnectionCap::resolve(false, lookup, self.default_cap),
            Err(e) => {
                warn!(
                    user_id = %identity.user_id,
                    error = %e,
                    "Cap lookup failed, applying most restrictive cap"
                );
                ConnectionCap::MOST_RESTRICTIVE
            }
        }
    }
}
