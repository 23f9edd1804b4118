//! Administrative subscription changes.
//!
//! Each operation writes the durable store first and only then disconnects
//! the user's live connections, so clients that reconnect see the new state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use seatmeter_core::error::AppError;
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::{AccountStore, AllowanceStore};
use seatmeter_core::types::{Allowance, AllowanceSnapshot, Plan, UserId};

use crate::meter::{AllowanceLanes, MeterClock};

use super::dispatcher::DisconnectDispatcher;

/// Reason sent when a plan is (re)applied.
pub const REASON_PLAN_UPDATED: &str = "plan updated";
/// Reason sent when an account is deactivated.
pub const REASON_DEACTIVATED: &str = "account deactivated";
/// Reason sent when the cap override changes.
pub const REASON_CAP_CHANGED: &str = "device limit changed";

/// A plan application request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChange {
    /// The plan to apply.
    pub plan: Plan,
    /// Connection cap carried by the plan, if it sets one.
    #[serde(default)]
    pub connection_cap: Option<u32>,
}

/// Applies plans, deactivations, and cap overrides.
pub struct SubscriptionControl {
    allowances: Arc<dyn AllowanceStore>,
    accounts: Arc<dyn AccountStore>,
    lanes: Arc<AllowanceLanes>,
    dispatcher: Arc<DisconnectDispatcher>,
    clock: MeterClock,
}

impl std::fmt::Debug for SubscriptionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionControl").finish()
    }
}

impl SubscriptionControl {
    /// Creates a new subscription controller.
    pub fn new(
        allowances: Arc<dyn AllowanceStore>,
        accounts: Arc<dyn AccountStore>,
        lanes: Arc<AllowanceLanes>,
        dispatcher: Arc<DisconnectDispatcher>,
        clock: MeterClock,
    ) -> Self {
        Self {
            allowances,
            accounts,
            lanes,
            dispatcher,
            clock,
        }
    }

    /// Rewrites the user's allowance from `change.plan` and disconnects the
    /// user so every connection re-admits under the new plan.
    pub async fn apply_plan(
        &self,
        user_id: &UserId,
        change: PlanChange,
    ) -> AppResult<AllowanceSnapshot> {
        change.plan.validate()?;
        if change.connection_cap == Some(0) {
            return Err(AppError::validation("A plan connection cap must be at least 1"));
        }

        let snapshot = {
            let _lane = self.lanes.lock(*user_id).await;
            let now = self.clock.now();
            let allowance = match self.allowances.get(user_id).await? {
                Some(mut existing) => {
                    existing.apply_plan(change.plan, now)?;
                    existing
                }
                None => Allowance::from_plan(*user_id, change.plan, now)?,
            };
            self.allowances.save(&allowance).await?;
            allowance.snapshot(now)
        };

        if let Some(cap) = change.connection_cap {
            self.accounts.set_plan_cap(user_id, Some(cap)).await?;
        }

        info!(user_id = %user_id, mode = %snapshot.mode.as_str(), "Plan applied");
        self.dispatcher
            .disconnect_all_for_user(user_id, REASON_PLAN_UPDATED)
            .await;
        Ok(snapshot)
    }

    /// Cancels the user's allowance and disconnects the user.
    ///
    /// Deactivating twice is a no-op; deactivating an allowance that is not
    /// active is a conflict.
    pub async fn deactivate(&self, user_id: &UserId) -> AppResult<()> {
        {
            let _lane = self.lanes.lock(*user_id).await;
            let mut allowance = self
                .allowances
                .get(user_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("No allowance for user {user_id}")))?;
            allowance.deactivate(self.clock.now())?;
            self.allowances.save(&allowance).await?;
        }

        info!(user_id = %user_id, "Account deactivated");
        self.dispatcher
            .disconnect_all_for_user(user_id, REASON_DEACTIVATED)
            .await;
        Ok(())
    }

    /// Sets (`Some`) or clears (`None`) the user's cap override and
    /// disconnects the user.
    pub async fn set_cap_override(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()> {
        if cap == Some(0) {
            return Err(AppError::validation("A connection cap must be at least 1"));
        }

        self.accounts.set_override(user_id, cap).await?;

        info!(user_id = %user_id, cap = ?cap, "Connection cap override changed");
        self.dispatcher
            .disconnect_all_for_user(user_id, REASON_CAP_CHANGED)
            .await;
        Ok(())
    }
}
