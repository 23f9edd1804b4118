//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use seatmeter_core::types::Plan;
use seatmeter_realtime::PlanChange;

/// Apply-plan request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPlanRequest {
    /// Plan to apply.
    pub plan: Plan,
    /// Connection cap carried by the plan.
    #[validate(range(min = 1, message = "Connection cap must be at least 1"))]
    #[serde(default)]
    pub connection_cap: Option<u32>,
}

impl From<ApplyPlanRequest> for PlanChange {
    fn from(req: ApplyPlanRequest) -> Self {
        Self {
            plan: req.plan,
            connection_cap: req.connection_cap,
        }
    }
}

/// Set or clear the per-user cap override. `null` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetLimitRequest {
    /// New override.
    #[validate(range(min = 1, message = "Connection limit must be at least 1"))]
    #[serde(default)]
    pub limit: Option<u32>,
}
