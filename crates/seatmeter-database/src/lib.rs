//! # seatmeter-database
//!
//! PostgreSQL connection management and the store implementations behind
//! the `seatmeter-core` collaborator traits. An in-memory backend with the
//! same contracts is provided for single-node deployments and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::{MemoryAccountStore, MemoryAllowanceStore, MemorySessionDirectory};
pub use repositories::{AccountRepository, AllowanceRepository, SessionRepository};
