//! The node registry component.
//!
//! [`NodeRegistry`] is the shared bookkeeping surface of the runtime: the
//! launcher writes lifecycle transitions, heartbeats promote nodes to
//! RUNNING, and everything else reads through copy-out queries.
//!
//! ## Architecture
//! ```text
//! Launcher ── register / update_status / set_pid ──┐
//! Bus heartbeat listener ── heartbeat(name, m) ────┼──► RwLock<RegistryState>
//! Node clients ── register_publisher/subscriber ───┘          │
//!                                                             ▼
//! Health monitor / reporters ◄── copy-out queries (cloned records)
//!
//! Optional: status transitions published to `system/registry`.
//! ```
//!
//! ## Rules
//! - Queries return **clones**, never live references — readers cannot
//!   observe or invalidate in-flight mutation.
//! - Dependency links are kept in **both directions** as name sets, so
//!   deregistration is O(degree), not a full scan. Reverse edges whose
//!   target is not yet registered are parked in a pending map and attached
//!   at registration time.
//! - `heartbeat()` promotes any non-terminal node to RUNNING.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::bus::{topics, Message, MessageBus, Priority};
use crate::launcher::NodeDescriptor;

use super::record::{NodeRecord, NodeStatus, ResourceMetrics};

#[derive(Default)]
struct RegistryState {
    records: HashMap<String, NodeRecord>,
    /// topic → publishing nodes
    publishers: HashMap<String, BTreeSet<String>>,
    /// topic → subscribed nodes
    subscribers: HashMap<String, BTreeSet<String>>,
    /// reverse edges whose target node is not registered yet
    pending_dependents: HashMap<String, BTreeSet<String>>,
}

/// Shared registry of node lifecycle state.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct NodeRegistry {
    state: Arc<RwLock<RegistryState>>,
    bus: Option<MessageBus>,
}

impl NodeRegistry {
    /// Creates a pure in-memory registry.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            bus: None,
        }
    }

    /// Creates a registry that publishes status transitions to
    /// [`topics::REGISTRY`].
    pub fn with_bus(bus: MessageBus) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            bus: Some(bus),
        }
    }

    /// Registers a node from its descriptor.
    ///
    /// Returns `false` if the name is already registered. Dependency edges
    /// are recorded in both directions.
    pub async fn register(&self, descriptor: &NodeDescriptor) -> bool {
        let name = descriptor.name.clone();
        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if state.records.contains_key(&name) {
                return false;
            }

            let mut record = NodeRecord::new(&name);
            record.requires = descriptor.requires.iter().cloned().collect();
            record.dependents = state.pending_dependents.remove(&name).unwrap_or_default();

            for dep in &descriptor.requires {
                if state.records.contains_key(dep) {
                    if let Some(target) = state.records.get_mut(dep) {
                        target.dependents.insert(name.clone());
                    }
                } else {
                    state
                        .pending_dependents
                        .entry(dep.clone())
                        .or_default()
                        .insert(name.clone());
                }
            }
            state.records.insert(name.clone(), record);
        }
        tracing::debug!(node = %name, "node registered");
        self.publish_status(&name, NodeStatus::Unknown, 0);
        true
    }

    /// Removes a node and cleans up its topic and dependency bookkeeping.
    ///
    /// Returns `false` if the name was not registered.
    pub async fn deregister(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let Some(record) = state.records.remove(name) else {
                return false;
            };

            for dep in &record.requires {
                if let Some(target) = state.records.get_mut(dep) {
                    target.dependents.remove(name);
                }
                if let Some(pending) = state.pending_dependents.get_mut(dep) {
                    pending.remove(name);
                    if pending.is_empty() {
                        state.pending_dependents.remove(dep);
                    }
                }
            }
            for topic in &record.publishes {
                if let Some(set) = state.publishers.get_mut(topic) {
                    set.remove(name);
                    if set.is_empty() {
                        state.publishers.remove(topic);
                    }
                }
            }
            for topic in &record.subscribes {
                if let Some(set) = state.subscribers.get_mut(topic) {
                    set.remove(name);
                    if set.is_empty() {
                        state.subscribers.remove(topic);
                    }
                }
            }
            record
        };
        tracing::debug!(node = name, "node deregistered");
        self.publish_status(name, NodeStatus::Stopped, removed.restart_count);
        true
    }

    /// Updates a node's lifecycle status.
    ///
    /// Entering STARTING stamps `started_at`; entering ERROR bumps the error
    /// counter. Unexpected transitions are logged, not rejected — the
    /// launcher is the only writer in practice.
    pub async fn update_status(&self, name: &str, status: NodeStatus) -> bool {
        let restart_count = {
            let mut state = self.state.write().await;
            let Some(record) = state.records.get_mut(name) else {
                return false;
            };
            let prev = record.status;
            if prev.is_terminal() && status.is_active() {
                tracing::debug!(node = name, from = %prev, to = %status, "reviving terminal node");
            }
            record.status = status;
            match status {
                NodeStatus::Starting => record.started_at = Some(Instant::now()),
                NodeStatus::Error => record.error_count += 1,
                _ => {}
            }
            record.restart_count
        };
        tracing::debug!(node = name, status = %status, "status updated");
        self.publish_status(name, status, restart_count);
        true
    }

    /// Records a heartbeat.
    ///
    /// Promotes the node to RUNNING unless
    /// [`NodeStatus::is_terminal`] holds: a heartbeat is authoritative
    /// evidence of health for a node that is starting or degraded, but a
    /// STOPPED or ERROR node only comes back through a supervised respawn.
    pub async fn heartbeat(&self, name: &str, metrics: ResourceMetrics) -> bool {
        let promoted = {
            let mut state = self.state.write().await;
            let Some(record) = state.records.get_mut(name) else {
                return false;
            };
            record.last_heartbeat = Some(Instant::now());
            record.metrics = metrics;
            if record.status != NodeStatus::Running && !record.status.is_terminal() {
                record.status = NodeStatus::Running;
                Some(record.restart_count)
            } else {
                None
            }
        };
        if let Some(restart_count) = promoted {
            tracing::debug!(node = name, "heartbeat promoted node to running");
            self.publish_status(name, NodeStatus::Running, restart_count);
        }
        true
    }

    /// Stores the node's OS process id.
    pub async fn set_pid(&self, name: &str, pid: Option<u32>) -> bool {
        let mut state = self.state.write().await;
        match state.records.get_mut(name) {
            Some(record) => {
                record.pid = pid;
                true
            }
            None => false,
        }
    }

    /// Increments and returns the node's restart counter.
    pub async fn increment_restart(&self, name: &str) -> Option<u32> {
        let mut state = self.state.write().await;
        let record = state.records.get_mut(name)?;
        record.restart_count += 1;
        Some(record.restart_count)
    }

    /// Records that `name` publishes to `topic`.
    pub async fn register_publisher(&self, name: &str, topic: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.records.get_mut(name) else {
            return false;
        };
        record.publishes.insert(topic.to_string());
        state
            .publishers
            .entry(topic.to_string())
            .or_default()
            .insert(name.to_string());
        true
    }

    /// Records that `name` subscribes to `topic`.
    pub async fn register_subscriber(&self, name: &str, topic: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.records.get_mut(name) else {
            return false;
        };
        record.subscribes.insert(topic.to_string());
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .insert(name.to_string());
        true
    }

    // ---------------------------
    // Copy-out queries
    // ---------------------------

    /// Cloned record for one node.
    pub async fn node(&self, name: &str) -> Option<NodeRecord> {
        self.state.read().await.records.get(name).cloned()
    }

    /// Cloned records for every node.
    pub async fn nodes(&self) -> Vec<NodeRecord> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Sorted names of all registered nodes.
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.records.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Sorted names of nodes currently in `status`.
    pub async fn nodes_by_status(&self, status: NodeStatus) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Nodes publishing to `topic`.
    pub async fn publishers_of(&self, topic: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .publishers
            .get(topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes subscribed to `topic`.
    pub async fn subscribers_of(&self, topic: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .subscribers
            .get(topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forward dependencies of `name`.
    pub async fn requires_of(&self, name: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .records
            .get(name)
            .map(|r| r.requires.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes that require `name`.
    pub async fn dependents_of(&self, name: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .records
            .get(name)
            .map(|r| r.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of registered nodes.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// True when no node is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    fn publish_status(&self, name: &str, status: NodeStatus, restart_count: u32) {
        if let Some(bus) = &self.bus {
            let payload = topics::StatusPayload {
                node: name.to_string(),
                status,
                restart_count,
            };
            bus.publish(
                Message::new(topics::REGISTRY, "registry", topics::to_value(&payload))
                    .with_priority(Priority::Low),
            );
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
