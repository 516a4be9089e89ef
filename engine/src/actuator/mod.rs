//! Actuator support
//!
//! Engine-side helpers around the [`sdk::actuator::Actuator`] trait:
//! bounded reconnection, credit metering and screen monitoring.

pub mod credits;
pub mod health;
pub mod monitor;

pub use credits::{parse_credit_reading, CreditDelta, CreditMeter};
pub use health::{Health, HealthMonitor};
pub use monitor::{Reaction, ScreenMonitor, WaitOutcome};
