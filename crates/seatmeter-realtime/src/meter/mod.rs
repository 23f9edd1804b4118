//! Allowance metering.

pub mod clock;
pub mod handle;
pub mod lanes;
pub mod usage;

pub use clock::MeterClock;
pub use handle::MeterHandle;
pub use lanes::AllowanceLanes;
pub use usage::{MeterStart, UsageMeter};
