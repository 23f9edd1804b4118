//! Scheduled maintenance for SeatMeter.
//!
//! This crate provides:
//! - A cron scheduler that drives the periodic sweeps
//! - The session sweep, which purges stale session directory rows
//! - The allowance sweep, which advances allowance status on the clock

pub mod jobs;
pub mod scheduler;

pub use jobs::{AllowanceSweep, SessionSweep};
pub use scheduler::CronScheduler;
