//! In-memory store implementations backed by `DashMap`.
//!
//! Each store can be switched into a failing mode so callers can exercise
//! their store-outage paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use seatmeter_core::error::AppError;
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::{AccountStore, AllowanceStore, SessionDirectory, SessionRecord};
use seatmeter_core::types::{Allowance, AllowanceStatus, CapLookup, UserId};

/// Shared on/off switch for simulated outages.
#[derive(Debug, Clone, Default)]
struct FailSwitch(Arc<AtomicBool>);

impl FailSwitch {
    fn set(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }

    fn check(&self, op: &str) -> AppResult<()> {
        if self.0.load(Ordering::SeqCst) {
            return Err(AppError::database(format!("{op}: store unavailable")));
        }
        Ok(())
    }
}

/// In-memory [`AllowanceStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryAllowanceStore {
    records: Arc<DashMap<UserId, Allowance>>,
    fail_reads: FailSwitch,
    fail_writes: FailSwitch,
}

impl MemoryAllowanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get` and `list_sweepable` calls fail.
    pub fn set_fail_reads(&self, failing: bool) {
        self.fail_reads.set(failing);
    }

    /// Make subsequent `save` calls fail.
    pub fn set_fail_writes(&self, failing: bool) {
        self.fail_writes.set(failing);
    }

    /// Read the stored record without going through the failure switch.
    pub fn peek(&self, user_id: &UserId) -> Option<Allowance> {
        self.records.get(user_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl AllowanceStore for MemoryAllowanceStore {
    async fn get(&self, user_id: &UserId) -> AppResult<Option<Allowance>> {
        self.fail_reads.check("allowance read")?;
        Ok(self.peek(user_id))
    }

    async fn save(&self, allowance: &Allowance) -> AppResult<()> {
        self.fail_writes.check("allowance write")?;
        self.records.insert(allowance.user_id, allowance.clone());
        Ok(())
    }

    async fn list_sweepable(&self) -> AppResult<Vec<Allowance>> {
        self.fail_reads.check("allowance scan")?;
        Ok(self
            .records
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    AllowanceStatus::Active | AllowanceStatus::ExpiringSoon
                )
            })
            .map(|r| r.value().clone())
            .collect())
    }
}

/// In-memory [`AccountStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    caps: Arc<DashMap<UserId, CapLookup>>,
    fail_reads: FailSwitch,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get_cap` calls fail.
    pub fn set_fail_reads(&self, failing: bool) {
        self.fail_reads.set(failing);
    }

    /// Current override for `user_id`, bypassing the fail switch.
    pub fn peek_override(&self, user_id: &UserId) -> Option<u32> {
        self.caps.get(user_id).and_then(|c| c.override_cap)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_cap(&self, user_id: &UserId) -> AppResult<CapLookup> {
        self.fail_reads.check("account read")?;
        Ok(self.caps.get(user_id).map(|c| *c).unwrap_or_default())
    }

    async fn set_override(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()> {
        self.caps.entry(*user_id).or_default().override_cap = cap;
        Ok(())
    }

    async fn set_plan_cap(&self, user_id: &UserId, cap: Option<u32>) -> AppResult<()> {
        self.caps.entry(*user_id).or_default().plan_cap = cap;
        Ok(())
    }
}

/// In-memory [`SessionDirectory`].
#[derive(Debug, Clone, Default)]
pub struct MemorySessionDirectory {
    rows: Arc<DashMap<(UserId, String), SessionRecord>>,
    fail_writes: FailSwitch,
}

impl MemorySessionDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `upsert` calls fail.
    pub fn set_fail_writes(&self, failing: bool) {
        self.fail_writes.set(failing);
    }

    /// Total number of rows across all users.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the directory holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl SessionDirectory for MemorySessionDirectory {
    async fn upsert(
        &self,
        user_id: &UserId,
        network_address: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.fail_writes.check("session upsert")?;
        self.rows
            .entry((*user_id, network_address.to_string()))
            .and_modify(|row| {
                row.user_agent = user_agent.map(str::to_string);
                row.last_activity_at = now;
            })
            .or_insert_with(|| SessionRecord {
                user_id: *user_id,
                network_address: network_address.to_string(),
                user_agent: user_agent.map(str::to_string),
                last_activity_at: now,
                created_at: now,
            });
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> AppResult<Vec<SessionRecord>> {
        let mut rows: Vec<SessionRecord> = self
            .rows
            .iter()
            .filter(|r| r.user_id == *user_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(rows)
    }

    async fn sweep_inactive(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let before = self.rows.len();
        self.rows.retain(|_, row| row.last_activity_at >= cutoff);
        Ok((before - self.rows.len()) as u64)
    }
}
