//! Cancellation handle for one running meter task.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use seatmeter_core::types::{ConnectionId, UserId};

/// Owned reference to a running meter task.
///
/// Stored on the connection's registry entry. Cancelling (or dropping) the
/// handle stops the task and removes it from the scheduled ledger in the
/// same call, so the ledger never counts a task that has been stopped.
#[derive(Debug)]
pub struct MeterHandle {
    conn_id: ConnectionId,
    token: CancellationToken,
    ledger: Arc<DashMap<ConnectionId, UserId>>,
}

impl MeterHandle {
    pub(crate) fn new(
        conn_id: ConnectionId,
        token: CancellationToken,
        ledger: Arc<DashMap<ConnectionId, UserId>>,
    ) -> Self {
        Self {
            conn_id,
            token,
            ledger,
        }
    }

    /// Stop the meter. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
        self.ledger.remove(&self.conn_id);
    }
}

impl Drop for MeterHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
