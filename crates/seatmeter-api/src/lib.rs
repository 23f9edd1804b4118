//! # seatmeter-api
//!
//! HTTP API layer for SeatMeter built on Axum.
//!
//! Provides the WebSocket upgrade endpoint, the admin endpoints that drive
//! subscription changes, extractors, DTOs, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
