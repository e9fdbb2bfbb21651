//! # Launcher: dependency-ordered startup, monitoring, and shutdown.
//!
//! The [`Launcher`] owns the node fleet. It registers descriptors with the
//! registry, resolves the start order, spawns every enabled node through
//! the injected [`Spawner`], and then supervises the fleet from a single
//! monitor loop.
//!
//! ## Phase machine
//! ```text
//! INITIALIZING → DISCOVERING → VALIDATING → CREATING → STARTING → RUNNING
//!                                                                    │
//!                              STOPPED ◄── STOPPING ◄────────────────┘
//! (ERROR is reachable from any phase)
//! ```
//!
//! ## Wiring
//! ```text
//! start(token):
//!   descriptors ──► registry.register ──► resolve_start_order (Kahn)
//!        │                                        │
//!        └──► spawner.spawn per node, in order, throttled by startup_delay
//!                     │
//!              wait_for_ready (bounded by ready_timeout, proceeds + logs)
//!                     │
//!              monitor_loop (~1 Hz):
//!                poll handles ──► exit? ──► ErrorHandler.handle_error
//!                     │                          │
//!                     │            Retry/RestartNode ──► delay queue
//!                     │            Suspend ──► trial respawn at breaker timeout
//!                     │            Shutdown / RestartSystem ──► escalate
//!                     └──► drain due delay-queue entries ──► respawn
//!
//! shutdown(): terminate all → bounded wait → force-kill; idempotent.
//! ```
//!
//! ## Rules
//! - The monitor loop is the only consumer of the restart delay queue, so
//!   restart attempts for one node are serialized.
//! - A node is restarted at most `max_restarts` times, then left in ERROR.
//! - Every loop checks the shutdown flag each iteration; restarts are never
//!   performed while the system is stopping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bus::{topics, MessageBus, SubscribeOptions};
use crate::config::OrchestratorConfig;
use crate::error::RuntimeError;
use crate::health::HealthMonitor;
use crate::recovery::{ErrorHandler, ErrorKind, RecoveryAction};
use crate::registry::{NodeRegistry, NodeStatus};

use super::descriptor::{GlobalOverrides, NodeDescriptor};
use super::resolve::{resolve_start_order, validate_manual_order};
use super::shutdown;
use super::spawn::{NodeExit, NodeHandle, Spawner};

/// Lifecycle phase of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPhase {
    Initializing,
    Discovering,
    Validating,
    Creating,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl LaunchPhase {
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchPhase::Initializing => "initializing",
            LaunchPhase::Discovering => "discovering",
            LaunchPhase::Validating => "validating",
            LaunchPhase::Creating => "creating",
            LaunchPhase::Starting => "starting",
            LaunchPhase::Running => "running",
            LaunchPhase::Stopping => "stopping",
            LaunchPhase::Stopped => "stopped",
            LaunchPhase::Error => "error",
        }
    }
}

impl std::fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

struct PendingRestart {
    node: String,
    due: Instant,
    /// Breaker-timed trial respawn rather than a policy restart.
    trial: bool,
}

struct LaunchState {
    phase: LaunchPhase,
    descriptors: HashMap<String, NodeDescriptor>,
    order: Vec<String>,
    handles: HashMap<String, Box<dyn NodeHandle>>,
    pending_restarts: Vec<PendingRestart>,
}

struct LauncherInner {
    config: OrchestratorConfig,
    bus: MessageBus,
    registry: NodeRegistry,
    recovery: ErrorHandler,
    health: HealthMonitor,
    spawner: Arc<dyn Spawner>,
    overrides: GlobalOverrides,
    state: Mutex<LaunchState>,
    shutting_down: AtomicBool,
}

/// Orchestrates the node fleet. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Launcher {
    inner: Arc<LauncherInner>,
}

impl Launcher {
    pub(crate) fn new_internal(
        config: OrchestratorConfig,
        bus: MessageBus,
        registry: NodeRegistry,
        recovery: ErrorHandler,
        health: HealthMonitor,
        spawner: Arc<dyn Spawner>,
        overrides: GlobalOverrides,
    ) -> Self {
        Self {
            inner: Arc::new(LauncherInner {
                config,
                bus,
                registry,
                recovery,
                health,
                spawner,
                overrides,
                state: Mutex::new(LaunchState {
                    phase: LaunchPhase::Initializing,
                    descriptors: HashMap::new(),
                    order: Vec::new(),
                    handles: HashMap::new(),
                    pending_restarts: Vec::new(),
                }),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    pub fn recovery(&self) -> &ErrorHandler {
        &self.inner.recovery
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.inner.health
    }

    pub async fn phase(&self) -> LaunchPhase {
        self.inner.state.lock().await.phase
    }

    /// Computed (or validated manual) start order. Empty before `start`.
    pub async fn start_order(&self) -> Vec<String> {
        self.inner.state.lock().await.order.clone()
    }

    /// Adds descriptors to the fleet with global overrides applied.
    /// Duplicated names are ignored with a warning. Returns how many were
    /// accepted. Must precede `start`.
    pub async fn load(&self, descriptors: Vec<NodeDescriptor>) -> usize {
        let mut state = self.inner.state.lock().await;
        let mut added = 0;
        for mut d in descriptors {
            if state.descriptors.contains_key(&d.name) {
                tracing::warn!(node = %d.name, "duplicate descriptor ignored");
                continue;
            }
            self.inner.overrides.apply(&mut d);
            state.descriptors.insert(d.name.clone(), d);
            added += 1;
        }
        added
    }

    /// Brings the whole fleet up: registration, order resolution, spawning,
    /// and the bounded wait for readiness, then hands the fleet over to the
    /// monitor loop.
    ///
    /// Resolution failures abort before any node is launched. A spawn
    /// failure aborts only when the node is critical; otherwise the node is
    /// marked ERROR and startup continues. A critical abort stops every
    /// node launched before the failure.
    pub async fn start(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        let mut state = self.inner.state.lock().await;
        if state.phase != LaunchPhase::Initializing {
            return Err(RuntimeError::AlreadyStarted {
                phase: state.phase.as_label().to_string(),
            });
        }

        self.transition(&mut state, LaunchPhase::Discovering);
        let mut descriptors: Vec<NodeDescriptor> = state.descriptors.values().cloned().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        for d in &descriptors {
            self.inner.registry.register(d).await;
            for topic in &d.provides {
                self.inner.registry.register_publisher(&d.name, topic).await;
            }
        }
        self.inner.health.set_critical(
            descriptors
                .iter()
                .filter(|d| d.critical)
                .map(|d| d.name.clone()),
        );

        self.transition(&mut state, LaunchPhase::Validating);
        let order = match &self.inner.config.start_order {
            Some(manual) => {
                if let Err(e) = validate_manual_order(manual, &descriptors) {
                    tracing::error!(error = %e, "manual start order rejected");
                    self.transition(&mut state, LaunchPhase::Error);
                    return Err(e.into());
                }
                manual.clone()
            }
            None => match resolve_start_order(&descriptors) {
                Ok(order) => order,
                Err(e) => {
                    tracing::error!(error = %e, "dependency resolution failed");
                    self.transition(&mut state, LaunchPhase::Error);
                    return Err(e.into());
                }
            },
        };
        tracing::info!(order = ?order, "start order resolved");
        state.order = order;

        self.transition(&mut state, LaunchPhase::Creating);
        if let Err(e) = self.launch_all(&mut state).await {
            // A critical node failed to come up; nodes launched before it
            // must not keep running with no monitor loop behind them.
            self.stop_all(&mut state).await;
            return Err(e);
        }

        self.transition(&mut state, LaunchPhase::Starting);
        drop(state);

        self.start_heartbeat_listener(token.clone());
        self.wait_for_ready(&token).await;

        let mut state = self.inner.state.lock().await;
        self.transition(&mut state, LaunchPhase::Running);
        drop(state);

        let launcher = self.clone();
        tokio::spawn(launcher.monitor_loop(token));
        Ok(())
    }

    /// Starts the bus, the health monitor and the fleet, then blocks until
    /// an OS termination signal arrives and shuts everything down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        self.inner.bus.start(token.clone());
        self.inner.health.start(token.clone());
        if let Err(e) = self.start(token.clone()).await {
            token.cancel();
            return Err(e);
        }

        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => { res?; }
            _ = token.cancelled() => {}
        }
        tracing::info!("termination signal received");
        self.shutdown().await;
        token.cancel();
        Ok(())
    }

    /// Stops the fleet: signal every node, wait up to `shutdown_timeout`
    /// for voluntary exit, force-kill stragglers. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown already in progress");
            return;
        }
        let mut state = self.inner.state.lock().await;
        state.pending_restarts.clear();
        self.transition(&mut state, LaunchPhase::Stopping);
        self.stop_all(&mut state).await;
        self.transition(&mut state, LaunchPhase::Stopped);
    }

    // ---------------------------
    // Startup internals
    // ---------------------------

    async fn launch_all(&self, state: &mut LaunchState) -> Result<(), RuntimeError> {
        let order = state.order.clone();
        let throttle = self.inner.config.launch_throttle();
        let mut first = true;
        for name in order {
            let Some(d) = state.descriptors.get(&name).cloned() else {
                continue;
            };
            if d.disabled {
                tracing::info!(node = %name, "node disabled, skipping");
                continue;
            }
            if !first {
                if let Some(delay) = throttle {
                    tokio::time::sleep(delay).await;
                }
            }
            first = false;
            self.spawn_node(state, &d).await?;
        }
        Ok(())
    }

    async fn spawn_node(
        &self,
        state: &mut LaunchState,
        d: &NodeDescriptor,
    ) -> Result<(), RuntimeError> {
        let env = d.merged_env(&self.inner.config.global_env);
        match self.inner.spawner.spawn(d, &env).await {
            Ok(handle) => {
                let pid = handle.pid();
                state.handles.insert(d.name.clone(), handle);
                self.inner.registry.set_pid(&d.name, pid).await;
                self.inner
                    .registry
                    .update_status(&d.name, NodeStatus::Starting)
                    .await;
                tracing::info!(node = %d.name, pid = ?pid, "node launched");
                Ok(())
            }
            Err(e) => {
                tracing::error!(node = %d.name, error = %e, "node spawn failed");
                self.inner
                    .registry
                    .update_status(&d.name, NodeStatus::Error)
                    .await;
                self.inner
                    .recovery
                    .handle_error(&d.name, ErrorKind::Crash, &e.to_string(), None, None);
                if d.critical {
                    self.transition(state, LaunchPhase::Error);
                    Err(RuntimeError::Spawn {
                        node: d.name.clone(),
                        source: e,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn wait_for_ready(&self, token: &CancellationToken) {
        let Some(wait) = self.inner.config.ready_wait() else {
            return;
        };
        let deadline = Instant::now() + wait;
        loop {
            if token.is_cancelled() {
                return;
            }
            let laggards = self.not_ready().await;
            if laggards.is_empty() {
                tracing::info!("all launched nodes running");
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    nodes = ?laggards,
                    "ready timeout elapsed; proceeding with degraded nodes"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Launched nodes not yet RUNNING, sorted.
    async fn not_ready(&self) -> Vec<String> {
        let launched: Vec<String> = {
            let state = self.inner.state.lock().await;
            state.handles.keys().cloned().collect()
        };
        let mut laggards = Vec::new();
        for name in launched {
            let running = self
                .inner
                .registry
                .node(&name)
                .await
                .map(|r| r.status == NodeStatus::Running)
                .unwrap_or(false);
            if !running {
                laggards.push(name);
            }
        }
        laggards.sort_unstable();
        laggards
    }

    fn start_heartbeat_listener(&self, token: CancellationToken) {
        let mut stream = self.inner.bus.subscribe(
            "launcher",
            topics::HEARTBEAT,
            SubscribeOptions::without_replay(),
        );
        let registry = self.inner.registry.clone();
        let recovery = self.inner.recovery.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = stream.recv() => {
                        let Some(msg) = msg else { break };
                        match topics::from_message::<topics::HeartbeatPayload>(&msg) {
                            Some(hb) => {
                                let was_running = registry
                                    .node(&hb.node)
                                    .await
                                    .map(|r| r.status == NodeStatus::Running)
                                    .unwrap_or(false);
                                if registry.heartbeat(&hb.node, hb.metrics).await && !was_running {
                                    // The node came (back) up; clear its retry
                                    // counters and close a half-open breaker.
                                    recovery.record_recovery_success(&hb.node);
                                }
                            }
                            None => {
                                tracing::debug!(source = %msg.source, "malformed heartbeat payload");
                            }
                        }
                    }
                }
            }
        });
    }

    // ---------------------------
    // Monitoring internals
    // ---------------------------

    async fn monitor_loop(self, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.inner.config.monitor_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            for (name, exit) in self.collect_exits().await {
                self.handle_exit(&name, exit).await;
            }
            self.run_due_restarts().await;
        }
        tracing::debug!("monitor loop stopped");
    }

    async fn collect_exits(&self) -> Vec<(String, NodeExit)> {
        let mut state = self.inner.state.lock().await;
        let mut exited = Vec::new();
        state.handles.retain(|name, handle| match handle.try_wait() {
            Some(exit) => {
                exited.push((name.clone(), exit));
                false
            }
            None => true,
        });
        exited.sort_by(|a, b| a.0.cmp(&b.0));
        exited
    }

    async fn handle_exit(&self, name: &str, exit: NodeExit) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let descriptor = {
            let state = self.inner.state.lock().await;
            state.descriptors.get(name).cloned()
        };
        let Some(d) = descriptor else { return };

        if exit.success {
            tracing::info!(node = name, "node exited cleanly");
        } else {
            tracing::warn!(node = name, code = ?exit.code, "node exited unexpectedly");
        }

        let action = if exit.success {
            None
        } else {
            let message = match exit.code {
                Some(code) => format!("process exited with code {code}"),
                None => "process exited abnormally".to_string(),
            };
            Some(
                self.inner
                    .recovery
                    .handle_error(name, ErrorKind::Crash, &message, None, None)
                    .action,
            )
        };

        match action {
            Some(RecoveryAction::Shutdown) => {
                self.inner
                    .registry
                    .update_status(name, NodeStatus::Error)
                    .await;
                tracing::error!(node = name, "failure escalated to system shutdown");
                self.shutdown().await;
                return;
            }
            Some(RecoveryAction::RestartSystem) => {
                self.inner
                    .registry
                    .update_status(name, NodeStatus::Error)
                    .await;
                self.restart_system().await;
                return;
            }
            Some(RecoveryAction::Suspend) => {
                tracing::warn!(node = name, "recovery suspended, breaker open");
            }
            _ => {}
        }

        if !d.restart.allows(exit.success) {
            let status = if exit.success {
                NodeStatus::Stopped
            } else {
                NodeStatus::Error
            };
            self.inner.registry.update_status(name, status).await;
            return;
        }

        let restart_count = self
            .inner
            .registry
            .node(name)
            .await
            .map(|r| r.restart_count)
            .unwrap_or(0);
        if restart_count >= d.max_restarts {
            self.inner
                .registry
                .update_status(name, NodeStatus::Error)
                .await;
            tracing::error!(
                node = name,
                restarts = restart_count,
                "restart budget exhausted, leaving node down"
            );
            return;
        }

        let status = if exit.success {
            NodeStatus::Stopped
        } else {
            NodeStatus::Error
        };
        self.inner.registry.update_status(name, status).await;

        // A suspended node gets a single trial respawn once the breaker's
        // open timeout elapses; otherwise the decision-table backoff and
        // the descriptor delay both apply.
        let (delay, trial) = match action {
            Some(RecoveryAction::Suspend) => (self.inner.config.recovery.open_timeout, true),
            Some(RecoveryAction::Retry { delay }) => (delay.max(d.restart_delay), false),
            _ => (d.restart_delay, false),
        };
        self.schedule_restart(name, delay, trial).await;
    }

    async fn schedule_restart(&self, name: &str, delay: Duration, trial: bool) {
        let mut state = self.inner.state.lock().await;
        if state.pending_restarts.iter().any(|p| p.node == name) {
            return;
        }
        state.pending_restarts.push(PendingRestart {
            node: name.to_string(),
            due: Instant::now() + delay,
            trial,
        });
        tracing::info!(node = name, delay = ?delay, trial, "restart scheduled");
    }

    async fn run_due_restarts(&self) {
        let now = Instant::now();
        let due: Vec<(String, bool)> = {
            let mut state = self.inner.state.lock().await;
            let mut due = Vec::new();
            state.pending_restarts.retain(|p| {
                if p.due <= now {
                    due.push((p.node.clone(), p.trial));
                    false
                } else {
                    true
                }
            });
            due
        };
        for (name, trial) in due {
            if self.inner.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            self.restart_node(&name, trial).await;
        }
    }

    async fn restart_node(&self, name: &str, trial: bool) {
        // A trial respawn claims the breaker's half-open slot first.
        if trial && !self.inner.recovery.begin_recovery(name) {
            tracing::warn!(node = name, "breaker refused trial respawn");
            return;
        }
        let mut state = self.inner.state.lock().await;
        let Some(d) = state.descriptors.get(name).cloned() else {
            return;
        };
        let attempt = self
            .inner
            .registry
            .increment_restart(name)
            .await
            .unwrap_or(0);
        tracing::info!(node = name, attempt, trial, "restarting node");
        if let Err(e) = self.spawn_node(&mut state, &d).await {
            tracing::error!(node = name, error = %e, "restart failed");
        }
    }

    async fn restart_system(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!("restarting entire system");
        let mut state = self.inner.state.lock().await;
        state.pending_restarts.clear();
        self.transition(&mut state, LaunchPhase::Stopping);
        self.stop_all(&mut state).await;
        self.transition(&mut state, LaunchPhase::Creating);
        match self.launch_all(&mut state).await {
            Ok(()) => self.transition(&mut state, LaunchPhase::Running),
            Err(e) => {
                tracing::error!(error = %e, "system restart failed");
                self.transition(&mut state, LaunchPhase::Error);
            }
        }
    }

    // ---------------------------
    // Shutdown internals
    // ---------------------------

    async fn stop_all(&self, state: &mut LaunchState) {
        for (name, handle) in state.handles.iter_mut() {
            tracing::info!(node = %name, "terminating node");
            handle.terminate();
            self.inner
                .registry
                .update_status(name, NodeStatus::Stopping)
                .await;
        }

        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        loop {
            let mut finished = Vec::new();
            state.handles.retain(|name, handle| {
                if handle.try_wait().is_some() {
                    finished.push(name.clone());
                    false
                } else {
                    true
                }
            });
            for name in &finished {
                self.inner
                    .registry
                    .update_status(name, NodeStatus::Stopped)
                    .await;
            }
            if state.handles.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stragglers: Vec<String> = state.handles.keys().cloned().collect();
        for (name, handle) in state.handles.iter_mut() {
            tracing::warn!(node = %name, "force killing node");
            handle.kill();
        }
        state.handles.clear();
        for name in stragglers {
            self.inner
                .registry
                .update_status(&name, NodeStatus::Stopped)
                .await;
        }
    }

    fn transition(&self, state: &mut LaunchState, to: LaunchPhase) {
        tracing::info!(from = state.phase.as_label(), to = to.as_label(), "phase transition");
        state.phase = to;
    }
}
