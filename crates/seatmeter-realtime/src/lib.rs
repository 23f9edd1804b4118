//! # seatmeter-realtime
//!
//! Real-time connection engine for SeatMeter. Provides:
//!
//! - Per-user connection registry with FIFO eviction
//! - Admission control against the resolved connection cap
//! - Hours/days allowance metering with one cancellable tick task per connection
//! - Live-connection directory pushed to admin connections
//! - Forced disconnects for eviction, exhaustion, and administrative changes

pub mod admission;
pub mod connection;
pub mod control;
pub mod directory;
pub mod message;
pub mod meter;
pub mod metrics;
pub mod server;

pub use admission::AdmissionController;
pub use connection::{ConnectionHandle, ConnectionRegistry};
pub use control::{DisconnectDispatcher, PlanChange, SubscriptionControl};
pub use directory::DirectoryBroadcaster;
pub use message::{InboundMessage, OutboundMessage};
pub use meter::{MeterStart, UsageMeter};
pub use metrics::EngineMetrics;
pub use server::{Connected, EngineStats, EngineStores, RealtimeEngine};
