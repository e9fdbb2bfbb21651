//! Per-node registry state.

use std::collections::BTreeSet;
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered node.
///
/// ```text
/// UNKNOWN → STARTING → RUNNING → STOPPING → STOPPED
///               │          │
///               └──────────┴──► ERROR / TIMEOUT
/// ```
///
/// `heartbeat()` promotes a non-terminal node back to RUNNING: a live
/// heartbeat is authoritative evidence of health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Registered but not yet launched.
    #[default]
    Unknown,
    /// Process created, waiting for the first heartbeat.
    Starting,
    /// Heartbeating within the configured window.
    Running,
    /// Terminate signal sent, waiting for exit.
    Stopping,
    /// Exited (cleanly or after shutdown).
    Stopped,
    /// Crashed, failed to start, or exhausted its restart budget.
    Error,
    /// Still registered but heartbeats stopped arriving.
    Timeout,
}

impl NodeStatus {
    /// True for states where the node is not expected to come back on its
    /// own. [`NodeRegistry::heartbeat`](crate::registry::NodeRegistry::heartbeat)
    /// will not promote a terminal node; the supervisor must respawn it,
    /// which moves it back through STARTING first.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Stopped | NodeStatus::Error)
    }

    /// True while the node is considered live (started or running).
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, NodeStatus::Starting | NodeStatus::Running)
    }

    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeStatus::Unknown => "unknown",
            NodeStatus::Starting => "starting",
            NodeStatus::Running => "running",
            NodeStatus::Stopping => "stopping",
            NodeStatus::Stopped => "stopped",
            NodeStatus::Error => "error",
            NodeStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Resource usage reported with a heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// CPU usage in percent of one core.
    pub cpu_percent: f32,
    /// Resident memory in megabytes.
    pub memory_mb: f32,
}

/// Registry record for one node.
///
/// Mutated by heartbeats and status updates; removed on deregistration.
/// Dependency links are stored as name sets in both directions so
/// deregistration cleans up in O(degree).
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Unique node name.
    pub name: String,
    /// Current lifecycle status.
    pub status: NodeStatus,
    /// OS process id, when the node runs isolated.
    pub pid: Option<u32>,
    /// When the node was registered.
    pub registered_at: SystemTime,
    /// When the node last entered STARTING.
    pub started_at: Option<Instant>,
    /// When the last heartbeat arrived.
    pub last_heartbeat: Option<Instant>,
    /// Restarts performed so far.
    pub restart_count: u32,
    /// Errors reported against this node.
    pub error_count: u32,
    /// Latest reported resource usage.
    pub metrics: ResourceMetrics,
    /// Topics this node publishes to.
    pub publishes: BTreeSet<String>,
    /// Topics this node subscribes to.
    pub subscribes: BTreeSet<String>,
    /// Forward dependencies (`requires`).
    pub requires: BTreeSet<String>,
    /// Reverse dependencies (nodes that require this one).
    pub dependents: BTreeSet<String>,
}

impl NodeRecord {
    /// Creates a fresh record in UNKNOWN status.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: NodeStatus::Unknown,
            pid: None,
            registered_at: SystemTime::now(),
            started_at: None,
            last_heartbeat: None,
            restart_count: 0,
            error_count: 0,
            metrics: ResourceMetrics::default(),
            publishes: BTreeSet::new(),
            subscribes: BTreeSet::new(),
            requires: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    /// Time since the last heartbeat, if one ever arrived.
    pub fn heartbeat_age(&self, now: Instant) -> Option<std::time::Duration> {
        self.last_heartbeat.map(|hb| now.saturating_duration_since(hb))
    }
}
