//! Session directory repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatmeter_core::error::{AppError, ErrorKind};
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::{SessionDirectory, SessionRecord};
use seatmeter_core::types::UserId;

#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    user_id: Uuid,
    network_address: String,
    user_agent: Option<String>,
    last_activity_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            network_address: row.network_address,
            user_agent: row.user_agent,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed [`SessionDirectory`] over the `sessions` table.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionDirectory for SessionRepository {
    async fn upsert(
        &self,
        user_id: &UserId,
        network_address: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO sessions (user_id, network_address, user_agent, last_activity_at, created_at) \
             VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (user_id, network_address) DO UPDATE SET \
                user_agent = EXCLUDED.user_agent, \
                last_activity_at = EXCLUDED.last_activity_at",
        )
        .bind(user_id.as_uuid())
        .bind(network_address)
        .bind(user_agent)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert session", e))?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE user_id = $1 ORDER BY last_activity_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list sessions", e))?;

        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn sweep_inactive(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE last_activity_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to sweep sessions", e)
            })?;
        Ok(result.rows_affected())
    }
}
