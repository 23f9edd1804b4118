//! Connection registry: all live connections indexed by user and by id.
//!
//! Each user owns an ordered collection of entries (oldest first). All
//! mutations of one user's collection go through that user's map entry, so
//! check-evict-insert and remove-cancel are single serialized steps. Nothing
//! in here awaits, so the per-user lock is never held across I/O.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use seatmeter_core::types::{ConnectionCap, ConnectionId, UserId};

use crate::meter::MeterHandle;

use super::handle::ConnectionHandle;

#[derive(Debug)]
struct Entry {
    handle: Arc<ConnectionHandle>,
    meter: Option<MeterHandle>,
}

impl Entry {
    /// Cancel the meter and hand back the connection.
    fn retire(self) -> Arc<ConnectionHandle> {
        if let Some(meter) = self.meter {
            meter.cancel();
        }
        self.handle
    }
}

/// A connection taken out of the registry.
#[derive(Debug, Clone)]
pub struct Removed {
    /// The removed connection.
    pub handle: Arc<ConnectionHandle>,
    /// Live connections the user still holds.
    pub remaining: usize,
}

/// Thread-safe registry of all live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// User ID → entries in admission order.
    by_user: DashMap<UserId, Vec<Entry>>,
    /// Connection ID → owning user.
    by_id: DashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection without any cap check.
    pub fn insert(&self, handle: Arc<ConnectionHandle>) {
        self.admit(handle, ConnectionCap::Unlimited);
    }

    /// Atomically enforces `cap` for the handle's user and registers it.
    ///
    /// Oldest connections are evicted until one more fits. Evicted entries
    /// have their meters cancelled and are returned oldest first; the caller
    /// is responsible for telling them why.
    pub fn admit(
        &self,
        handle: Arc<ConnectionHandle>,
        cap: ConnectionCap,
    ) -> Vec<Arc<ConnectionHandle>> {
        let user_id = handle.user_id;
        let mut entries = self.by_user.entry(user_id).or_default();

        let mut evicted = Vec::new();
        while !entries.is_empty() && cap.is_reached_by(entries.len()) {
            let oldest = entries.remove(0).retire();
            self.by_id.remove(&oldest.id);
            evicted.push(oldest);
        }

        self.by_id.insert(handle.id, user_id);
        debug!(
            conn_id = %handle.id,
            user_id = %user_id,
            count = entries.len() + 1,
            cap = %cap,
            "Connection registered"
        );
        entries.push(Entry {
            handle,
            meter: None,
        });

        evicted
    }

    /// Stores the meter handle on a live connection.
    ///
    /// Returns the handle back if the connection is no longer registered, so
    /// the caller can cancel it.
    pub fn attach_meter(
        &self,
        conn_id: &ConnectionId,
        meter: MeterHandle,
    ) -> Result<(), MeterHandle> {
        let Some(user_id) = self.owner_of(conn_id) else {
            return Err(meter);
        };
        let Some(mut entries) = self.by_user.get_mut(&user_id) else {
            return Err(meter);
        };
        match entries.iter_mut().find(|e| e.handle.id == *conn_id) {
            Some(entry) => {
                if let Some(previous) = entry.meter.replace(meter) {
                    previous.cancel();
                }
                Ok(())
            }
            None => Err(meter),
        }
    }

    /// Cancels and detaches a connection's meter, if any. Idempotent.
    pub fn stop_meter(&self, conn_id: &ConnectionId) -> bool {
        let Some(user_id) = self.owner_of(conn_id) else {
            return false;
        };
        let Some(mut entries) = self.by_user.get_mut(&user_id) else {
            return false;
        };
        entries
            .iter_mut()
            .find(|e| e.handle.id == *conn_id)
            .and_then(|e| e.meter.take())
            .map(|meter| meter.cancel())
            .is_some()
    }

    /// Removes a connection, cancelling its meter in the same step.
    ///
    /// Removing an unknown or already removed connection returns `None`.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Removed> {
        let user_id = self.owner_of(conn_id)?;
        let mut entries = self.by_user.get_mut(&user_id)?;
        let pos = entries.iter().position(|e| e.handle.id == *conn_id)?;
        let handle = entries.remove(pos).retire();
        self.by_id.remove(conn_id);
        let remaining = entries.len();
        drop(entries);

        if remaining == 0 {
            self.by_user.remove_if(&user_id, |_, v| v.is_empty());
        }

        Some(Removed { handle, remaining })
    }

    /// Removes every connection of a user, cancelling their meters.
    pub fn remove_all_for(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        let Some((_, entries)) = self.by_user.remove(user_id) else {
            return Vec::new();
        };
        entries
            .into_iter()
            .map(|entry| {
                let handle = entry.retire();
                self.by_id.remove(&handle.id);
                handle
            })
            .collect()
    }

    /// Number of live connections for a user.
    pub fn count(&self, user_id: &UserId) -> usize {
        self.by_user.get(user_id).map(|e| e.len()).unwrap_or(0)
    }

    /// The user's earliest-admitted live connection.
    pub fn oldest_for(&self, user_id: &UserId) -> Option<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .and_then(|e| e.first().map(|entry| Arc::clone(&entry.handle)))
    }

    /// All of a user's live connections, oldest first.
    pub fn connections_for(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|e| e.iter().map(|entry| Arc::clone(&entry.handle)).collect())
            .unwrap_or_default()
    }

    /// Looks up a live connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let user_id = self.owner_of(conn_id)?;
        self.by_user.get(&user_id).and_then(|e| {
            e.iter()
                .find(|entry| entry.handle.id == *conn_id)
                .map(|entry| Arc::clone(&entry.handle))
        })
    }

    /// Whether a connection currently has a meter attached.
    pub fn has_meter(&self, conn_id: &ConnectionId) -> bool {
        let Some(user_id) = self.owner_of(conn_id) else {
            return false;
        };
        self.by_user.get(&user_id).is_some_and(|e| {
            e.iter()
                .any(|entry| entry.handle.id == *conn_id && entry.meter.is_some())
        })
    }

    /// All live admin connections.
    pub fn all_admins(&self) -> Vec<Arc<ConnectionHandle>> {
        self.collect(|h| h.is_admin)
    }

    /// All live connections, ordered by admission time.
    pub fn list_all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.collect(|_| true)
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Number of users with at least one live connection.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    fn owner_of(&self, conn_id: &ConnectionId) -> Option<UserId> {
        self.by_id.get(conn_id).map(|u| *u.value())
    }

    fn collect(&self, keep: impl Fn(&ConnectionHandle) -> bool) -> Vec<Arc<ConnectionHandle>> {
        let mut all: Vec<Arc<ConnectionHandle>> = self
            .by_user
            .iter()
            .flat_map(|e| {
                e.value()
                    .iter()
                    .filter(|entry| keep(entry.handle.as_ref()))
                    .map(|entry| Arc::clone(&entry.handle))
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        all
    }
}
