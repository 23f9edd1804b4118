//! Custom Axum extractors.

pub mod admin;
pub mod peer;
pub mod validated;

pub use admin::AdminUser;
pub use peer::PeerAddr;
pub use validated::ValidatedJson;
