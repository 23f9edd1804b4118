//! PostgreSQL implementations of the collaborator traits.

pub mod account;
pub mod allowance;
pub mod session;

pub use account::AccountRepository;
pub use allowance::AllowanceRepository;
pub use session::SessionRepository;
