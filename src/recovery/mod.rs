//! Error classification, recovery decisions and per-node circuit breaking.

mod breaker;
mod handler;

pub use breaker::{BreakerState, CircuitBreaker};
pub use handler::{ErrorHandler, ErrorKind, ErrorRecord, ErrorReport, RecoveryAction, Severity};
