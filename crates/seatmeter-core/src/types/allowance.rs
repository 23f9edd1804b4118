//! Metered allowance domain types.
//!
//! An allowance is held in one of two modes. Days-mode grants access until a
//! wall-clock window closes; hours-mode grants a balance of hours drawn down by a
//! wall clock that starts on the first metered connection and keeps running
//! across disconnects until the balance is spent. The two modes
//! are modelled as variants of [`Grant`] so that hours-only state such as the
//! meter start can never be read on a days-mode record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::id::UserId;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Which metering model an allowance uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowanceMode {
    /// Fixed wall-clock window.
    Days,
    /// Hour balance consumed while connected.
    Hours,
}

impl AllowanceMode {
    /// Return the mode as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
        }
    }
}

impl std::str::FromStr for AllowanceMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "days" => Ok(Self::Days),
            "hours" => Ok(Self::Hours),
            other => Err(AppError::validation(format!("Unknown allowance mode: {other}"))),
        }
    }
}

/// Lifecycle status of an allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceStatus {
    /// Usable.
    Active,
    /// Days-mode window closes within the warning horizon.
    ExpiringSoon,
    /// Window closed or hours used up. Leaves only through a plan re-application.
    Expired,
    /// Administratively deactivated. Terminal.
    Cancelled,
}

impl AllowanceStatus {
    /// Return the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ExpiringSoon => "expiring_soon",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for AllowanceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expiring_soon" => Ok(Self::ExpiringSoon),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::validation(format!(
                "Unknown allowance status: {other}"
            ))),
        }
    }
}

/// Mode-specific allowance state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Grant {
    /// Access until `window_end`.
    Days {
        /// Start of the paid window.
        window_start: DateTime<Utc>,
        /// End of the paid window.
        window_end: DateTime<Utc>,
        /// Length of the window as sold, in days.
        total_days: u32,
    },
    /// Access for `total_hours` of connected time.
    Hours {
        /// Hours granted by the plan.
        total_hours: f64,
        /// Informational mirror of the clock-derived usage.
        used_hours: f64,
        /// When the shared clock started. Set once, cleared only by a plan re-application.
        meter_started_at: Option<DateTime<Utc>>,
    },
}

/// Longest window a days plan may grant.
pub const MAX_PLAN_DAYS: u32 = 36_500;

/// A plan as applied by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Plan {
    /// A window of `days` starting now.
    Days {
        /// Window length.
        days: u32,
    },
    /// A balance of `hours`.
    Hours {
        /// Balance in hours.
        hours: f64,
    },
}

impl Plan {
    /// Reject plans that would grant nothing.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Days { days } if *days == 0 => {
                Err(AppError::validation("A days plan must grant at least one day"))
            }
            Self::Days { days } if *days > MAX_PLAN_DAYS => Err(AppError::validation(format!(
                "A days plan may grant at most {MAX_PLAN_DAYS} days"
            ))),
            Self::Hours { hours } if !hours.is_finite() || *hours <= 0.0 => Err(
                AppError::validation("An hours plan must grant a positive number of hours"),
            ),
            _ => Ok(()),
        }
    }

    /// Build a fresh grant starting at `now`.
    ///
    /// Fails when the window end does not fit in the calendar.
    pub fn into_grant(self, now: DateTime<Utc>) -> AppResult<Grant> {
        match self {
            Self::Days { days } => {
                let window_end = Duration::try_days(i64::from(days))
                    .and_then(|span| now.checked_add_signed(span))
                    .ok_or_else(|| {
                        AppError::validation(format!("A {days}-day window is out of range"))
                    })?;
                Ok(Grant::Days {
                    window_start: now,
                    window_end,
                    total_days: days,
                })
            }
            Self::Hours { hours } => Ok(Grant::Hours {
                total_hours: hours,
                used_hours: 0.0,
                meter_started_at: None,
            }),
        }
    }
}

/// Client-facing view of an allowance at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceSnapshot {
    /// Remaining hours (hours-mode) or the fixed day grant (days-mode).
    pub remaining: f64,
    /// Total granted.
    pub available: f64,
    /// Consumed so far (always `0` in days-mode).
    pub used: f64,
    /// Metering model.
    pub mode: AllowanceMode,
    /// Whole days left until the window closes (days-mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

/// Durable per-user allowance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    /// Owning user.
    pub user_id: UserId,
    /// Mode-specific state.
    pub grant: Grant,
    /// Lifecycle status.
    pub status: AllowanceStatus,
    /// Whether the allowance currently grants access.
    pub active: bool,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl Allowance {
    /// Create an allowance from a freshly applied plan.
    pub fn from_plan(user_id: UserId, plan: Plan, now: DateTime<Utc>) -> AppResult<Self> {
        Ok(Self {
            user_id,
            grant: plan.into_grant(now)?,
            status: AllowanceStatus::Active,
            active: true,
            updated_at: now,
        })
    }

    /// Metering model of this allowance.
    pub fn mode(&self) -> AllowanceMode {
        match self.grant {
            Grant::Days { .. } => AllowanceMode::Days,
            Grant::Hours { .. } => AllowanceMode::Hours,
        }
    }

    /// Whole days until the window closes, rounded up, never negative.
    ///
    /// Returns `None` for hours-mode allowances.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        match &self.grant {
            Grant::Days { window_end, .. } => {
                let millis = (*window_end - now).num_milliseconds();
                if millis <= 0 {
                    Some(0)
                } else {
                    Some((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY)
                }
            }
            Grant::Hours { .. } => None,
        }
    }

    /// Hours elapsed on the shared clock, `0` if the clock has not started.
    pub fn hours_elapsed(&self, now: DateTime<Utc>) -> f64 {
        match &self.grant {
            Grant::Hours {
                meter_started_at: Some(started),
                ..
            } => ((now - *started).num_milliseconds() as f64 / MILLIS_PER_HOUR).max(0.0),
            _ => 0.0,
        }
    }

    /// Hours left, never negative. `None` for days-mode allowances.
    pub fn hours_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        match &self.grant {
            Grant::Hours { total_hours, .. } => {
                Some((total_hours - self.hours_elapsed(now)).max(0.0))
            }
            Grant::Days { .. } => None,
        }
    }

    /// Whether the meter clock is running.
    pub fn is_meter_running(&self) -> bool {
        matches!(
            self.grant,
            Grant::Hours {
                meter_started_at: Some(_),
                ..
            }
        )
    }

    /// Whether this allowance no longer grants access.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        if !self.active
            || matches!(
                self.status,
                AllowanceStatus::Expired | AllowanceStatus::Cancelled
            )
        {
            return true;
        }

        match &self.grant {
            Grant::Days { .. } => self.days_remaining(now).unwrap_or(0) <= 0,
            Grant::Hours { total_hours, .. } => self.hours_elapsed(now) >= *total_hours,
        }
    }

    /// Start the shared hours clock if it is not already running.
    ///
    /// Returns `true` only when this call started it. A clock that is already
    /// running is left untouched so that reconnects never rewind it.
    pub fn start_meter(&mut self, now: DateTime<Utc>) -> bool {
        match &mut self.grant {
            Grant::Hours {
                meter_started_at, ..
            } if meter_started_at.is_none() => {
                *meter_started_at = Some(now);
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Mirror the clock-derived usage into `used_hours`.
    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        let elapsed = self.hours_elapsed(now);
        if let Grant::Hours {
            total_hours,
            used_hours,
            meter_started_at: Some(_),
        } = &mut self.grant
        {
            *used_hours = elapsed.min(*total_hours);
            self.updated_at = now;
        }
    }

    /// Mark the allowance as used up.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.record_usage(now);
        self.status = AllowanceStatus::Expired;
        self.active = false;
        self.updated_at = now;
    }

    /// Replace the grant with a freshly applied plan.
    ///
    /// This is the only way out of `Expired` and the only place the meter
    /// start is cleared. A plan whose grant cannot be built leaves the allowance untouched.
    pub fn apply_plan(&mut self, plan: Plan, now: DateTime<Utc>) -> AppResult<()> {
        self.grant = plan.into_grant(now)?;
        self.status = AllowanceStatus::Active;
        self.active = true;
        self.updated_at = now;
        Ok(())
    }

    /// Administratively cancel the allowance.
    ///
    /// Only an `Active` allowance can be cancelled; cancelling twice is a no-op.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        match self.status {
            AllowanceStatus::Active => {
                self.record_usage(now);
                self.status = AllowanceStatus::Cancelled;
                self.active = false;
                self.updated_at = now;
                Ok(())
            }
            AllowanceStatus::Cancelled => Ok(()),
            other => Err(AppError::conflict(format!(
                "Cannot deactivate an allowance in status '{}'",
                other.as_str()
            ))),
        }
    }

    /// Advance `status` based on the clock.
    ///
    /// Returns the new status when it changed.
    pub fn advance_status(
        &mut self,
        now: DateTime<Utc>,
        expiring_soon_days: i64,
    ) -> Option<AllowanceStatus> {
        if !matches!(
            self.status,
            AllowanceStatus::Active | AllowanceStatus::ExpiringSoon
        ) {
            return None;
        }

        match &self.grant {
            Grant::Days { window_end, .. } => {
                if now >= *window_end {
                    self.mark_expired(now);
                    return Some(AllowanceStatus::Expired);
                }
                if self.status == AllowanceStatus::Active
                    && *window_end - now <= Duration::days(expiring_soon_days)
                {
                    self.status = AllowanceStatus::ExpiringSoon;
                    self.updated_at = now;
                    return Some(AllowanceStatus::ExpiringSoon);
                }
                None
            }
            Grant::Hours { total_hours, .. } => {
                if self.is_meter_running() && self.hours_elapsed(now) >= *total_hours {
                    self.mark_expired(now);
                    return Some(AllowanceStatus::Expired);
                }
                None
            }
        }
    }

    /// Build the client-facing view at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> AllowanceSnapshot {
        match &self.grant {
            Grant::Days { total_days, .. } => AllowanceSnapshot {
                remaining: f64::from(*total_days),
                available: f64::from(*total_days),
                used: 0.0,
                mode: AllowanceMode::Days,
                days_remaining: self.days_remaining(now),
            },
            Grant::Hours { total_hours, .. } => {
                let used = self.hours_elapsed(now).min(*total_hours);
                AllowanceSnapshot {
                    remaining: (total_hours - used).max(0.0),
                    available: *total_hours,
                    used,
                    mode: AllowanceMode::Hours,
                    days_remaining: None,
                }
            }
        }
    }
}
