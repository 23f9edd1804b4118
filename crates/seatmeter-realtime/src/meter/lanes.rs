//! Per-user serialization of allowance read-modify-write cycles.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use seatmeter_core::types::UserId;

/// One async mutex per user, held across allowance store I/O.
///
/// This is never the registry lock: registry mutations stay synchronous and
/// never wait on a lane.
#[derive(Debug, Default)]
pub struct AllowanceLanes {
    lanes: DashMap<UserId, Arc<Mutex<()>>>,
}

impl AllowanceLanes {
    /// Create an empty lane set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `user_id`'s allowance.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lane = self.lanes.entry(user_id).or_default().clone();
        lane.lock_owned().await
    }

    /// Drop the lane for `user_id` if nobody holds or waits on it.
    pub fn release(&self, user_id: &UserId) {
        self.lanes
            .remove_if(user_id, |_, lane| Arc::strong_count(lane) == 1);
    }

    /// Number of users with a lane.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Whether no lanes exist.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}
