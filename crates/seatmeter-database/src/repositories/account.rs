//! Account cap repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use seatmeter_core::error::{AppError, ErrorKind};
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::AccountStore;
use seatmeter_core::types::{CapLookup, UserId};

/// PostgreSQL-backed [`AccountStore`] over the `account_caps` table.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    /// Create a new account repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_column(cap: Option<u32>) -> Option<i32> {
    cap.map(|c| i32::try_from(c).unwrap_or(i32::MAX))
}

fn from_column(cap: Option<i32>) -> Option<u32> {
    cap.and_then(|c| u32::try_from(c).ok())
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn get_cap(&self, user_id: &UserId) -> AppResult<CapLookup> {
        let row: Option<(Option<i32>, Option<i32>)> = sqlx::query_as(
            "SELECT override_cap, plan_cap FROM account_caps WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load account cap", e))?;

        Ok(row
            .map(|(override_cap, plan_cap)| CapLookup {
                override_cap: from_column(override_cap),
                plan_cap: from_column(plan_cap),
            })
            .unwrap_or_default())
    }

    async fn set_override(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO account_caps (user_id, override_cap) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                override_cap = EXCLUDED.override_cap, \
                updated_at = NOW()",
        )
        .bind(user_id.as_uuid())
        .bind(to_column(cap))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to set cap override", e)
        })?;
        Ok(())
    }

    async fn set_plan_cap(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO account_caps (user_id, plan_cap) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                plan_cap = EXCLUDED.plan_cap, \
                updated_at = NOW()",
        )
        .bind(user_id.as_uuid())
        .bind(to_column(cap))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set plan cap", e))?;
        Ok(())
    }
}
