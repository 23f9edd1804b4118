//! Collaborator traits defined in `seatmeter-core` and implemented by other crates.

pub mod account_store;
pub mod allowance_store;
pub mod identity;
pub mod session_directory;

pub use account_store::AccountStore;
pub use allowance_store::AllowanceStore;
pub use identity::IdentityResolver;
pub use session_directory::{SessionDirectory, SessionRecord};
