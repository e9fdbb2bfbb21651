//! Restart and retry policies.
//!
//! This module groups the knobs that control **if** a node is restarted
//! after its process exits and **how long** recovery waits between attempts.
//!
//! ## Contents
//! - [`RestartPolicy`] when to restart a node (never / on_failure / always)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//!
//! ## Quick wiring
//! ```text
//! NodeDescriptor { restart, max_restarts, restart_delay }
//!      └─► launcher monitor loop uses:
//!           - restart.allows(exit_success) to decide eligibility
//!           - restart_delay before the rescheduled launch
//! ErrorHandler retry actions use BackoffPolicy::next(retry_count)
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
