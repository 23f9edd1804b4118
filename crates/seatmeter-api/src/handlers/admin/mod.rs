//! Admin handlers. Every route requires an administrator bearer token.

pub mod connections;
pub mod users;
