//! Sweep job implementations.

pub mod allowance_sweep;
pub mod session_sweep;

pub use allowance_sweep::{AllowanceSweep, SweepReport};
pub use session_sweep::SessionSweep;
