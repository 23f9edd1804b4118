//! Forced disconnects and the administrative operations that trigger them.

pub mod dispatcher;
pub mod subscription;

pub use dispatcher::DisconnectDispatcher;
pub use subscription::{PlanChange, SubscriptionControl};
