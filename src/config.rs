//! Global runtime configuration.
//!
//! Provides [`OrchestratorConfig`], the centralized settings consumed by the
//! launcher, plus the nested [`BusConfig`] and [`RecoveryConfig`] sections.
//!
//! Config is used in two ways:
//! 1. **Launcher construction**: `LauncherBuilder::new(config)`
//! 2. **Component defaults**: the bus, health monitor, and error handler read
//!    their sections at build time.
//!
//! ## Sentinel values
//! - `startup_delay = 0s` → no throttle between node launches
//! - `ready_timeout = 0s` → do not wait for nodes to become RUNNING
//! - `bus.retention_per_topic = 0` → retention disabled (no replay)

use std::collections::HashMap;
use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Global configuration for the orchestration runtime.
///
/// Defines:
/// - **Startup behavior**: inter-node launch throttle and readiness wait
/// - **Shutdown behavior**: grace window before force-kill
/// - **Monitoring cadence**: process poll and heartbeat scan intervals
/// - **Environment**: global variables merged under per-node overrides
/// - **Subsystem sections**: [`BusConfig`], [`RecoveryConfig`]
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Delay inserted between consecutive node launches (`0s` = no throttle).
    ///
    /// Throttles launch bursts so a fleet of heavy processes does not start
    /// in the same instant.
    pub startup_delay: Duration,

    /// Maximum time `start()` waits for every non-disabled node to reach
    /// RUNNING (`0s` = skip the wait).
    ///
    /// On expiry startup proceeds anyway; the nodes still not healthy are
    /// logged, not aborted.
    pub ready_timeout: Duration,

    /// Maximum time shutdown waits for voluntary exits before force-killing
    /// stragglers.
    pub shutdown_timeout: Duration,

    /// Interval of the process-monitoring loop (~1 Hz by default).
    pub monitor_interval: Duration,

    /// Interval of the health monitor's heartbeat scan.
    pub health_interval: Duration,

    /// A RUNNING node whose last heartbeat is older than this transitions
    /// to TIMEOUT on the next health scan.
    pub heartbeat_timeout: Duration,

    /// Environment variables applied to every node, overridden by each
    /// descriptor's own `env` (global < per-node).
    pub global_env: HashMap<String, String>,

    /// Explicit manual start order. When set, it is validated to cover
    /// exactly the discovered node set and then trusted over the computed
    /// topological order.
    pub start_order: Option<Vec<String>>,

    /// Message-bus settings.
    pub bus: BusConfig,

    /// Error-handler and circuit-breaker settings.
    pub recovery: RecoveryConfig,
}

impl OrchestratorConfig {
    /// Returns the readiness wait as an `Option` (`0s` → `None`).
    #[inline]
    pub fn ready_wait(&self) -> Option<Duration> {
        if self.ready_timeout == Duration::ZERO {
            None
        } else {
            Some(self.ready_timeout)
        }
    }

    /// Returns the launch throttle as an `Option` (`0s` → `None`).
    #[inline]
    pub fn launch_throttle(&self) -> Option<Duration> {
        if self.startup_delay == Duration::ZERO {
            None
        } else {
            Some(self.startup_delay)
        }
    }
}

impl Default for OrchestratorConfig {
    /// Default configuration:
    ///
    /// - `startup_delay = 100ms`
    /// - `ready_timeout = 30s`
    /// - `shutdown_timeout = 30s`
    /// - `monitor_interval = 1s`
    /// - `health_interval = 5s`
    /// - `heartbeat_timeout = 15s`
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_millis(100),
            ready_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(1),
            health_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
            global_env: HashMap::new(),
            start_order: None,
            bus: BusConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Message-bus settings.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Capacity of the internal delivery queue. `publish()` returns `false`
    /// when the queue is full (counted, never blocking).
    pub queue_capacity: usize,

    /// Retained messages kept per topic for late joiners (`0` = disabled).
    pub retention_per_topic: usize,

    /// Default bounded queue size for each subscriber. A full subscriber
    /// queue drops that single delivery (counted, not fatal).
    pub subscriber_queue_capacity: usize,
}

impl BusConfig {
    /// Delivery-queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// True when topic retention is enabled.
    #[inline]
    pub fn retention_enabled(&self) -> bool {
        self.retention_per_topic > 0
    }
}

impl Default for BusConfig {
    /// Default: `queue_capacity = 1024`, `retention_per_topic = 100`,
    /// `subscriber_queue_capacity = 256`.
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retention_per_topic: 100,
            subscriber_queue_capacity: 256,
        }
    }
}

/// Error-handler and circuit-breaker settings.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    /// Trailing window over which HIGH/CRITICAL failures are counted.
    pub failure_window: Duration,

    /// Failures within the window that trip a node's breaker open.
    pub failure_threshold: u32,

    /// Time an open breaker waits before allowing a half-open trial.
    pub open_timeout: Duration,

    /// Backoff applied to retry recovery actions (attempt-indexed).
    pub retry_backoff: BackoffPolicy,

    /// Maximum error records retained for queries (oldest evicted first).
    pub max_records: usize,
}

impl Default for RecoveryConfig {
    /// Default: 1h window, threshold 5, 60s open timeout, exponential
    /// retry backoff (500ms, ×2, cap 30s), 512 retained records.
    fn default() -> Self {
        Self {
            failure_window: Duration::from_secs(3600),
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            retry_backoff: BackoffPolicy {
                first: Duration::from_millis(500),
                max: Duration::from_secs(30),
                factor: 2.0,
                jitter: crate::policies::JitterPolicy::None,
            },
            max_records: 512,
        }
    }
}
