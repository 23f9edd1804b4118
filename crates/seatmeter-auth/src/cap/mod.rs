//! Connection cap resolution.

pub mod resolver;

pub use resolver::CapResolver;
