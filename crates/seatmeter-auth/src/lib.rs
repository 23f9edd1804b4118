//! # seatmeter-auth
//!
//! Credential verification and per-user connection cap resolution.
//!
//! ## Modules
//!
//! - `jwt`: HS256 token verification behind the `IdentityResolver` trait
//! - `cap`: connection cap lookup with the most-restrictive fallback

pub mod cap;
pub mod jwt;

pub use cap::CapResolver;
pub use jwt::{Claims, JwtDecoder};
