//! Core type definitions used across the SeatMeter workspace.

pub mod allowance;
pub mod connection_cap;
pub mod id;
pub mod identity;

pub use allowance::{
    Allowance, AllowanceMode, AllowanceSnapshot, AllowanceStatus, Grant, Plan,
};
pub use connection_cap::{CapLookup, ConnectionCap};
pub use id::*;
pub use identity::{ClientInfo, Identity};
