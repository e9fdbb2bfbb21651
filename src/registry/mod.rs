//! Node registry: lifecycle status, heartbeats, topic and dependency
//! bookkeeping.
//!
//! ## Contents
//! - [`NodeStatus`], [`NodeRecord`], [`ResourceMetrics`] — per-node state
//! - [`NodeRegistry`] — the shared registry component
//!
//! The registry is the read side of the runtime: the launcher writes
//! lifecycle transitions, heartbeats arrive over the bus, and every other
//! component (health monitor, status reporters) reads through copy-out
//! queries.

mod record;
#[allow(clippy::module_inception)]
mod registry;

pub use record::{NodeRecord, NodeStatus, ResourceMetrics};
pub use registry::NodeRegistry;
