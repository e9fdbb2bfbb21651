//! Heartbeat-timeout scanning and health scoring.

mod monitor;

pub use monitor::{HealthMonitor, HealthReport};
