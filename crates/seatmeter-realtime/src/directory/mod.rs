//! Admin directory of live connections.

pub mod broadcaster;

pub use broadcaster::DirectoryBroadcaster;
