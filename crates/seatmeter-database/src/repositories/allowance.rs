//! Allowance repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use seatmeter_core::error::{AppError, ErrorKind};
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::AllowanceStore;
use seatmeter_core::types::{Allowance, AllowanceMode, AllowanceStatus, Grant, UserId};

/// Flat row shape of the `allowances` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct AllowanceRow {
    user_id: Uuid,
    mode: String,
    total_available: f64,
    used: f64,
    meter_started_at: Option<DateTime<Utc>>,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    status: String,
    active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AllowanceRow> for Allowance {
    type Error = AppError;

    fn try_from(row: AllowanceRow) -> Result<Self, Self::Error> {
        let grant = match row.mode.parse::<AllowanceMode>()? {
            AllowanceMode::Days => {
                let (Some(window_start), Some(window_end)) = (row.window_start, row.window_end)
                else {
                    return Err(AppError::database(format!(
                        "Days allowance for user {} has no window",
                        row.user_id
                    )));
                };
                Grant::Days {
                    window_start,
                    window_end,
                    total_days: row.total_available.max(0.0).round() as u32,
                }
            }
            AllowanceMode::Hours => Grant::Hours {
                total_hours: row.total_available,
                used_hours: row.used,
                meter_started_at: row.meter_started_at,
            },
        };

        Ok(Allowance {
            user_id: UserId::from_uuid(row.user_id),
            grant,
            status: row.status.parse::<AllowanceStatus>()?,
            active: row.active,
            updated_at: row.updated_at,
        })
    }
}

/// Decodes sweep candidates, skipping rows that do not form a valid allowance.
fn decode_sweepable(rows: Vec<AllowanceRow>) -> Vec<Allowance> {
    rows.into_iter()
        .filter_map(|row| {
            let user_id = row.user_id;
            Allowance::try_from(row)
                .inspect_err(|e| {
                    warn!(user_id = %user_id, error = %e, "Skipping malformed allowance row")
                })
                .ok()
        })
        .collect()
}

/// PostgreSQL-backed [`AllowanceStore`].
#[derive(Debug, Clone)]
pub struct AllowanceRepository {
    pool: PgPool,
}

impl AllowanceRepository {
    /// Create a new allowance repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AllowanceStore for AllowanceRepository {
    async fn get(&self, user_id: &UserId) -> AppResult<Option<Allowance>> {
        let row = sqlx::query_as::<_, AllowanceRow>("SELECT * FROM allowances WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to load allowance", e)
            })?;

        row.map(Allowance::try_from).transpose()
    }

    async fn save(&self, allowance: &Allowance) -> AppResult<()> {
        let (total, used, meter_started_at, window_start, window_end) = match &allowance.grant {
            Grant::Days {
                window_start,
                window_end,
                total_days,
            } => (
                f64::from(*total_days),
                0.0,
                None,
                Some(*window_start),
                Some(*window_end),
            ),
            Grant::Hours {
                total_hours,
                used_hours,
                meter_started_at,
            } => (*total_hours, *used_hours, *meter_started_at, None, None),
        };

        sqlx::query(
            "INSERT INTO allowances \
                (user_id, mode, total_available, used, meter_started_at, window_start, window_end, status, active, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET \
                mode = EXCLUDED.mode, \
                total_available = EXCLUDED.total_available, \
                used = EXCLUDED.used, \
                meter_started_at = EXCLUDED.meter_started_at, \
                window_start = EXCLUDED.window_start, \
                window_end = EXCLUDED.window_end, \
                status = EXCLUDED.status, \
                active = EXCLUDED.active, \
                updated_at = EXCLUDED.updated_at",
        )
        .bind(allowance.user_id.as_uuid())
        .bind(allowance.mode().as_str())
        .bind(total)
        .bind(used)
        .bind(meter_started_at)
        .bind(window_start)
        .bind(window_end)
        .bind(allowance.status.as_str())
        .bind(allowance.active)
        .bind(allowance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to save allowance", e))?;

        Ok(())
    }

    async fn list_sweepable(&self) -> AppResult<Vec<Allowance>> {
        let rows = sqlx::query_as::<_, AllowanceRow>(
            "SELECT * FROM allowances WHERE status IN ('active', 'expiring_soon') ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list sweepable allowances", e)
        })?;

        Ok(decode_sweepable(rows))
    }
}
