//! Live connection handles and the per-user connection registry.

pub mod handle;
pub mod registry;

pub use handle::ConnectionHandle;
pub use registry::{ConnectionRegistry, Removed};
