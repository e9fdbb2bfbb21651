//! Well-known system topics and their payloads.
//!
//! The runtime publishes its own observability traffic over the same bus
//! the nodes use. Payloads are serde structs serialized to JSON; consumers
//! decode with [`from_message`].
//!
//! | Topic | Payload | Publisher |
//! |---|---|---|
//! | `system/registry`  | [`StatusPayload`]    | registry (status transitions) |
//! | `system/heartbeat` | [`HeartbeatPayload`] | node clients |
//! | `system/health`    | [`HealthPayload`]    | health monitor |
//! | `system/errors`    | [`ErrorPayload`]     | error handler |

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::recovery::Severity;
use crate::registry::{NodeStatus, ResourceMetrics};

use super::message::Message;

/// Registry status transitions.
pub const REGISTRY: &str = "system/registry";
/// Node heartbeats (consumed by the launcher's heartbeat listener).
pub const HEARTBEAT: &str = "system/heartbeat";
/// Periodic system health reports.
pub const HEALTH: &str = "system/health";
/// Error reports and chosen recovery actions.
pub const ERRORS: &str = "system/errors";

/// Prefix for private request/response reply topics.
pub(crate) const REPLY_PREFIX: &str = "_reply";

/// One node heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// Reporting node.
    pub node: String,
    /// Resource usage at report time.
    #[serde(default)]
    pub metrics: ResourceMetrics,
}

/// A registry status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Affected node.
    pub node: String,
    /// New status.
    pub status: NodeStatus,
    /// Restarts performed so far.
    pub restart_count: u32,
}

/// A periodic health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    /// Weighted health score in `[0, 1]`.
    pub score: f64,
    /// Overall verdict (false once any critical node is unhealthy).
    pub healthy: bool,
    /// Names of nodes currently not RUNNING.
    pub degraded: Vec<String>,
}

/// An error report with its recovery decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error record id.
    pub id: u64,
    /// Node the error was reported against.
    pub node: String,
    /// Error kind label.
    pub kind: String,
    /// Classified severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Chosen recovery action label.
    pub action: String,
}

/// Serializes a payload, falling back to `Null` on failure.
///
/// Payload structs above cannot fail to serialize; the fallback exists so
/// publication paths never propagate errors.
pub fn to_value<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Decodes a typed payload from a message, `None` when the shape mismatches.
pub fn from_message<T: DeserializeOwned>(message: &Message) -> Option<T> {
    serde_json::from_value(message.payload.clone()).ok()
}
