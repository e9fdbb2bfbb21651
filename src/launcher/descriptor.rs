//! Node descriptors: the unit of launcher configuration.
//!
//! A [`NodeDescriptor`] describes one managed node: how to create it, what
//! it depends on, and how to react when it dies. Descriptors are produced
//! by an external configuration loader and handed to the launcher as
//! already-parsed values; the launcher never reads files itself.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::RestartPolicy;

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_isolate() -> bool {
    true
}

/// Description of one managed node.
///
/// Only `name` and `kind` are mandatory; everything else has a sensible
/// default so descriptors deserialize from sparse configuration entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node name.
    pub name: String,
    /// Node type key; selects the in-process factory for non-isolated nodes.
    pub kind: String,
    /// Command line (program + args) for isolated nodes.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Names of nodes that must be started before this one.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Topics this node intends to publish to.
    #[serde(default)]
    pub provides: Vec<String>,
    /// When to restart the node after it exits.
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Upper bound on automatic restarts before the node is left down.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Delay between an exit and the scheduled restart.
    #[serde(default = "default_restart_delay")]
    pub restart_delay: Duration,
    /// Per-node environment overrides (win over global entries).
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Run as a separate OS process (`true`) or an in-process task.
    #[serde(default = "default_isolate")]
    pub isolate: bool,
    /// Whether this node's failure makes the whole system unhealthy.
    #[serde(default)]
    pub critical: bool,
    /// Disabled nodes are registered and resolved but never launched.
    #[serde(default)]
    pub disabled: bool,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            command: None,
            requires: Vec::new(),
            provides: Vec::new(),
            restart: RestartPolicy::default(),
            max_restarts: default_max_restarts(),
            restart_delay: default_restart_delay(),
            env: HashMap::new(),
            isolate: default_isolate(),
            critical: false,
            disabled: false,
        }
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_requires(mut self, requires: Vec<String>) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy, max_restarts: u32) -> Self {
        self.restart = restart;
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Marks the node as an in-process task (kind selects the factory).
    pub fn in_process(mut self) -> Self {
        self.isolate = false;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Merged environment: global entries overridden by per-node ones.
    pub fn merged_env(&self, global: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = global.clone();
        for (k, v) in &self.env {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Fleet-wide adjustments applied over descriptors before dependency
/// resolution runs.
///
/// Overrides come from the same external loader as the descriptors (a
/// deployment profile, a CLI flag set) and let one configuration enable or
/// disable nodes without editing every descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOverrides {
    /// Nodes to mark disabled regardless of their descriptor.
    pub disable: BTreeSet<String>,
    /// Nodes to force-enable; wins over both `disable` and the descriptor.
    pub enable: BTreeSet<String>,
    /// Environment entries overlaid on every node (win over per-node ones).
    pub env: HashMap<String, String>,
}

impl GlobalOverrides {
    pub fn is_empty(&self) -> bool {
        self.disable.is_empty() && self.enable.is_empty() && self.env.is_empty()
    }

    /// Applies the overrides to one descriptor in place.
    pub fn apply(&self, descriptor: &mut NodeDescriptor) {
        if self.disable.contains(&descriptor.name) {
            descriptor.disabled = true;
        }
        if self.enable.contains(&descriptor.name) {
            descriptor.disabled = false;
        }
        for (k, v) in &self.env {
            descriptor.env.insert(k.clone(), v.clone());
        }
    }
}
