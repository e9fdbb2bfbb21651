//! Heartbeat-timeout scanning and system health scoring.
//!
//! [`HealthMonitor`] periodically compares each RUNNING node's heartbeat
//! age against the configured timeout and transitions stale nodes to
//! TIMEOUT through the registry. It never kills anything; acting on a
//! timed-out node is the launcher's and error handler's business.
//!
//! Each scan also aggregates a weighted health score. Critical nodes weigh
//! double and gate the overall verdict: a failed non-critical node lowers
//! the score but never flips `healthy` to false on its own.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::bus::{topics, Message, MessageBus};
use crate::config::OrchestratorConfig;
use crate::registry::{NodeRecord, NodeRegistry, NodeStatus};

/// Weight of a critical node in the score denominator.
const CRITICAL_WEIGHT: f64 = 2.0;

/// Outcome of one health scan.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// Weighted share of RUNNING nodes in `[0, 1]`. `1.0` for an empty
    /// registry.
    pub score: f64,
    /// True while every critical node is RUNNING.
    pub healthy: bool,
    /// Sorted names of nodes currently not RUNNING.
    pub degraded: Vec<String>,
    /// Nodes transitioned to TIMEOUT by this scan.
    pub timed_out: Vec<String>,
}

/// Periodic heartbeat scanner. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: NodeRegistry,
    bus: Option<MessageBus>,
    interval: Duration,
    heartbeat_timeout: Duration,
    critical: Arc<Mutex<BTreeSet<String>>>,
}

impl HealthMonitor {
    pub fn new(config: &OrchestratorConfig, registry: NodeRegistry) -> Self {
        Self {
            registry,
            bus: None,
            interval: config.health_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            critical: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Monitor that also publishes each report to [`topics::HEALTH`].
    pub fn with_bus(config: &OrchestratorConfig, registry: NodeRegistry, bus: MessageBus) -> Self {
        let mut monitor = Self::new(config, registry);
        monitor.bus = Some(bus);
        monitor
    }

    /// Replaces the set of critical node names.
    pub fn set_critical(&self, names: impl IntoIterator<Item = String>) {
        *self.lock_critical() = names.into_iter().collect();
    }

    /// Spawns the scan loop. The loop exits within one interval of `token`
    /// being cancelled.
    pub fn start(&self, token: CancellationToken) {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(monitor.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {}
                }
                let report = monitor.scan().await;
                monitor.publish_report(&report);
            }
            tracing::debug!("health monitor stopped");
        });
    }

    /// Runs one scan: times out stale RUNNING nodes, then scores the fleet.
    pub async fn scan(&self) -> HealthReport {
        let now = Instant::now();
        let mut timed_out = Vec::new();
        for record in self.registry.nodes().await {
            if record.status == NodeStatus::Running && self.is_stale(&record, now) {
                timed_out.push(record.name.clone());
            }
        }
        timed_out.sort_unstable();
        for name in &timed_out {
            tracing::warn!(node = %name, "heartbeat timeout");
            self.registry.update_status(name, NodeStatus::Timeout).await;
        }

        self.score(self.registry.nodes().await, timed_out)
    }

    fn is_stale(&self, record: &NodeRecord, now: Instant) -> bool {
        // Nodes promoted to RUNNING without a heartbeat yet are measured
        // from their start time.
        let age = record
            .heartbeat_age(now)
            .or_else(|| record.started_at.map(|at| now.saturating_duration_since(at)));
        matches!(age, Some(age) if age > self.heartbeat_timeout)
    }

    fn score(&self, records: Vec<NodeRecord>, timed_out: Vec<String>) -> HealthReport {
        let critical = self.lock_critical();
        let mut total = 0.0;
        let mut running = 0.0;
        let mut degraded = Vec::new();
        let mut healthy = true;

        for record in &records {
            let is_critical = critical.contains(&record.name);
            let weight = if is_critical { CRITICAL_WEIGHT } else { 1.0 };
            total += weight;
            if record.status == NodeStatus::Running {
                running += weight;
            } else {
                degraded.push(record.name.clone());
                if is_critical {
                    healthy = false;
                }
            }
        }
        degraded.sort_unstable();

        HealthReport {
            score: if total == 0.0 { 1.0 } else { running / total },
            healthy,
            degraded,
            timed_out,
        }
    }

    fn publish_report(&self, report: &HealthReport) {
        if let Some(bus) = &self.bus {
            let payload = topics::HealthPayload {
                score: report.score,
                healthy: report.healthy,
                degraded: report.degraded.clone(),
            };
            bus.publish(Message::new(
                topics::HEALTH,
                "health",
                topics::to_value(&payload),
            ));
        }
    }

    fn lock_critical(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        match self.critical.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::NodeDescriptor;
    use crate::registry::ResourceMetrics;

    fn config(timeout: Duration) -> OrchestratorConfig {
        let mut cfg = OrchestratorConfig::default();
        cfg.heartbeat_timeout = timeout;
        cfg
    }

    async fn registry_with(names: &[&str]) -> NodeRegistry {
        let reg = NodeRegistry::new();
        for name in names {
            assert!(reg.register(&NodeDescriptor::new(*name, "test")).await);
        }
        reg
    }

    #[tokio::test]
    async fn empty_registry_is_healthy() {
        let reg = NodeRegistry::new();
        let monitor = HealthMonitor::new(&config(Duration::from_secs(15)), reg);
        let report = monitor.scan().await;
        assert_eq!(report.score, 1.0);
        assert!(report.healthy);
        assert!(report.degraded.is_empty());
    }

    #[tokio::test]
    async fn fresh_heartbeats_keep_nodes_running() {
        let reg = registry_with(&["a", "b"]).await;
        for n in ["a", "b"] {
            reg.heartbeat(n, ResourceMetrics::default()).await;
        }
        let monitor = HealthMonitor::new(&config(Duration::from_secs(15)), reg.clone());
        let report = monitor.scan().await;
        assert!(report.timed_out.is_empty());
        assert_eq!(report.score, 1.0);
        assert!(report.healthy);
    }

    #[tokio::test]
    async fn stale_running_node_is_timed_out() {
        let reg = registry_with(&["a"]).await;
        reg.heartbeat("a", ResourceMetrics::default()).await;

        // Zero timeout: any heartbeat age is stale.
        let monitor = HealthMonitor::new(&config(Duration::ZERO), reg.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = monitor.scan().await;

        assert_eq!(report.timed_out, vec!["a".to_string()]);
        assert_eq!(
            reg.node("a").await.map(|r| r.status),
            Some(NodeStatus::Timeout)
        );
        assert_eq!(report.degraded, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn non_running_nodes_are_not_scanned() {
        let reg = registry_with(&["a"]).await;
        reg.update_status("a", NodeStatus::Stopped).await;
        let monitor = HealthMonitor::new(&config(Duration::ZERO), reg.clone());
        let report = monitor.scan().await;
        assert!(report.timed_out.is_empty());
        assert_eq!(
            reg.node("a").await.map(|r| r.status),
            Some(NodeStatus::Stopped)
        );
    }

    #[tokio::test]
    async fn non_critical_failure_degrades_but_stays_healthy() {
        let reg = registry_with(&["core", "extra"]).await;
        reg.heartbeat("core", ResourceMetrics::default()).await;
        reg.update_status("extra", NodeStatus::Error).await;

        let monitor = HealthMonitor::new(&config(Duration::from_secs(15)), reg);
        monitor.set_critical(["core".to_string()]);
        let report = monitor.scan().await;

        assert!(report.healthy);
        assert_eq!(report.degraded, vec!["extra".to_string()]);
        // critical running (2.0) out of 3.0 total weight
        assert!((report.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn critical_failure_flips_overall_health() {
        let reg = registry_with(&["core", "extra"]).await;
        reg.update_status("core", NodeStatus::Error).await;
        reg.heartbeat("extra", ResourceMetrics::default()).await;

        let monitor = HealthMonitor::new(&config(Duration::from_secs(15)), reg);
        monitor.set_critical(["core".to_string()]);
        let report = monitor.scan().await;

        assert!(!report.healthy);
        assert_eq!(report.degraded, vec!["core".to_string()]);
    }
}
