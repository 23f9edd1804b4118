//! Connection admission and the session directory adapter.

pub mod controller;
pub mod session_log;

pub use controller::{Admission, AdmissionController};
pub use session_log::SessionLog;
