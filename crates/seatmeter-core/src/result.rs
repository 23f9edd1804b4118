//! Convenience result type alias for SeatMeter.

use crate::error::AppError;

/// A specialized `Result` type for SeatMeter operations.
pub type AppResult<T> = Result<T, AppError>;
