//! # seatmeter-core
//!
//! Core crate for SeatMeter. Contains the allowance and connection-cap
//! domain types, typed identifiers, the collaborator traits implemented by
//! the store crates, configuration schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other SeatMeter crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
