//! Concurrent connection cap resolution types.

use serde::{Deserialize, Serialize};

/// Raw cap values as stored by the account store.
///
/// A stored value of `0` is treated the same as "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapLookup {
    /// Per-user override set by an administrator.
    pub override_cap: Option<u32>,
    /// Cap carried by the user's plan.
    pub plan_cap: Option<u32>,
}

/// Resolved connection cap for a user.
///
/// Caps are resolved in priority order:
/// 1. Administrators are never capped
/// 2. Per-user override
/// 3. Plan cap
/// 4. Configured default (normally `1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionCap {
    /// A fixed maximum number of simultaneous live connections.
    Fixed(u32),
    /// No per-user limit.
    Unlimited,
}

impl ConnectionCap {
    /// The most restrictive cap, used when the account store cannot be read.
    pub const MOST_RESTRICTIVE: ConnectionCap = ConnectionCap::Fixed(1);

    /// Resolve the effective cap from a lookup result.
    pub fn resolve(is_admin: bool, lookup: CapLookup, default_cap: u32) -> Self {
        if is_admin {
            return Self::Unlimited;
        }

        let cap = lookup
            .override_cap
            .filter(|c| *c > 0)
            .or(lookup.plan_cap.filter(|c| *c > 0))
            .unwrap_or(default_cap.max(1));

        Self::Fixed(cap)
    }

    /// Check whether admitting one more connection on top of `live_count`
    /// requires evicting an existing one.
    pub fn is_reached_by(&self, live_count: usize) -> bool {
        match self {
            Self::Fixed(max) => live_count >= *max as usize,
            Self::Unlimited => false,
        }
    }
}

impl std::fmt::Display for ConnectionCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(max) => write!(f, "{max}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}
