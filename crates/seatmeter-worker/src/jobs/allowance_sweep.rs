//! Clock-driven allowance status transitions.
//!
//! Days-mode windows never tick, so nothing else notices when one ends while
//! its owner is offline. This sweep walks every allowance that can still
//! change on its own, moves it to `expiring_soon` or `expired`, and closes
//! the owner's live connections on expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use seatmeter_core::result::AppResult;
use seatmeter_core::traits::AllowanceStore;
use seatmeter_core::types::{AllowanceStatus, UserId};
use seatmeter_realtime::control::DisconnectDispatcher;
use seatmeter_realtime::meter::AllowanceLanes;
use seatmeter_realtime::meter::usage::MSG_EXHAUSTED;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Allowances that moved to `expiring_soon`.
    pub expiring_soon: usize,
    /// Allowances that moved to `expired`.
    pub expired: usize,
}

/// Advances allowance status on the clock.
pub struct AllowanceSweep {
    allowances: Arc<dyn AllowanceStore>,
    lanes: Arc<AllowanceLanes>,
    dispatcher: Arc<DisconnectDispatcher>,
    expiring_soon_days: i64,
}

impl std::fmt::Debug for AllowanceSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowanceSweep")
            .field("expiring_soon_days", &self.expiring_soon_days)
            .finish()
    }
}

impl AllowanceSweep {
    /// Create a new allowance sweep
    pub fn new(
        allowances: Arc<dyn AllowanceStore>,
        lanes: Arc<AllowanceLanes>,
        dispatcher: Arc<DisconnectDispatcher>,
        expiring_soon_days: i64,
    ) -> Self {
        Self {
            allowances,
            lanes,
            dispatcher,
            expiring_soon_days,
        }
    }

    /// Run one pass at `now`.
    ///
    /// A failure on one user is logged and the pass moves on.
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let candidates = self.allowances.list_sweepable().await?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            let user_id = candidate.user_id;
            match self.advance(&user_id, now).await {
                Ok(Some(AllowanceStatus::ExpiringSoon)) => report.expiring_soon += 1,
                Ok(Some(AllowanceStatus::Expired)) => {
                    report.expired += 1;
                    let closed = self.dispatcher.exhaust_user(&user_id, MSG_EXHAUSTED).await;
                    tracing::info!(
                        "Allowance for user {} expired, closed {} connections",
                        user_id,
                        closed
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Allowance sweep skipped user {}: {}", user_id, e);
                }
            }
        }

        if report.expiring_soon > 0 || report.expired > 0 {
            tracing::info!(
                "Allowance sweep: {} expiring soon, {} expired",
                report.expiring_soon,
                report.expired
            );
        }
        Ok(report)
    }

    /// Re-read under the user's lane so a concurrent plan change is never overwritten.
    async fn advance(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AllowanceStatus>> {
        let _lane = self.lanes.lock(*user_id).await;
        let Some(mut allowance) = self.allowances.get(user_id).await? else {
            return Ok(None);
        };

        let changed = allowance.advance_status(now, self.expiring_soon_days);
        if changed.is_some() {
            self.allowances.save(&allowance).await?;
        }
        Ok(changed)
    }
}
