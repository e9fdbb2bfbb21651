//! Node creation: OS processes and in-process tasks behind one seam.
//!
//! The launcher never talks to `tokio::process` or the task system
//! directly; it spawns through the [`Spawner`] trait and polls the
//! returned [`NodeHandle`]. Two implementations exist:
//!
//! - [`ProcessSpawner`] — isolated nodes, one OS process per node.
//! - [`LocalSpawner`] — in-process nodes, one task per node, created from
//!   a compile-time factory table keyed by descriptor `kind`.
//!
//! [`DefaultSpawner`] routes between them on the descriptor's `isolate`
//! flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::error::SpawnError;

use super::descriptor::NodeDescriptor;

/// Terminal outcome of one node incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeExit {
    /// Whether the node finished cleanly.
    pub success: bool,
    /// OS exit code when available.
    pub code: Option<i32>,
}

/// Live handle to one running node.
pub trait NodeHandle: Send {
    /// OS process id, `None` for in-process nodes.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking poll for termination. `None` while still running.
    fn try_wait(&mut self) -> Option<NodeExit>;

    /// Asks the node to stop (SIGTERM / cancellation).
    fn terminate(&mut self);

    /// Forcibly stops the node.
    fn kill(&mut self);
}

/// Creates node handles from descriptors.
#[async_trait]
pub trait Spawner: Send + Sync {
    async fn spawn(
        &self,
        descriptor: &NodeDescriptor,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn NodeHandle>, SpawnError>;
}

// ---------------------------
// OS processes
// ---------------------------

/// Spawns isolated nodes as OS processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessSpawner;

#[async_trait]
impl Spawner for ProcessSpawner {
    async fn spawn(
        &self,
        descriptor: &NodeDescriptor,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn NodeHandle>, SpawnError> {
        let command = descriptor
            .command
            .as_deref()
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| SpawnError::MissingCommand {
                node: descriptor.name.clone(),
            })?;

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]).envs(env).kill_on_drop(true);
        let child = cmd.spawn()?;
        Ok(Box::new(ProcessHandle { child }))
    }
}

struct ProcessHandle {
    child: Child,
}

impl NodeHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> Option<NodeExit> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(NodeExit {
                success: status.success(),
                code: status.code(),
            }),
            Ok(None) => None,
            // The child is unreachable (e.g. already reaped); report it down.
            Err(_) => Some(NodeExit {
                success: false,
                code: None,
            }),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

// ---------------------------
// In-process tasks
// ---------------------------

/// Everything an in-process node body receives from the runtime.
pub struct NodeContext {
    /// Node name from the descriptor.
    pub name: String,
    /// Shared message bus, for heartbeats and data topics.
    pub bus: MessageBus,
    /// Cancelled when the node should stop.
    pub token: CancellationToken,
    /// Merged node environment.
    pub env: HashMap<String, String>,
}

/// Future produced by a node factory.
pub type NodeFuture = BoxFuture<'static, Result<(), Box<dyn std::error::Error + Send + Sync>>>;

/// One entry of the factory table.
pub type NodeFactory = Arc<dyn Fn(NodeContext) -> NodeFuture + Send + Sync>;

const LOCAL_RUNNING: u8 = 0;
const LOCAL_OK: u8 = 1;
const LOCAL_FAILED: u8 = 2;

/// Spawns non-isolated nodes as tasks from a factory table.
///
/// The table is fixed at build time; an unmatched `kind` is a spawn error,
/// not a fallback.
#[derive(Clone)]
pub struct LocalSpawner {
    bus: MessageBus,
    factories: HashMap<String, NodeFactory>,
}

impl LocalSpawner {
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            factories: HashMap::new(),
        }
    }

    /// Registers a factory for the given node kind, replacing any previous
    /// entry.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(NodeContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

#[async_trait]
impl Spawner for LocalSpawner {
    async fn spawn(
        &self,
        descriptor: &NodeDescriptor,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn NodeHandle>, SpawnError> {
        let factory = self
            .factories
            .get(&descriptor.kind)
            .ok_or_else(|| SpawnError::UnknownKind {
                kind: descriptor.kind.clone(),
            })?;

        let token = CancellationToken::new();
        let ctx = NodeContext {
            name: descriptor.name.clone(),
            bus: self.bus.clone(),
            token: token.clone(),
            env: env.clone(),
        };

        let name = descriptor.name.clone();
        let outcome = Arc::new(AtomicU8::new(LOCAL_RUNNING));
        let fut = factory(ctx);
        let flag = Arc::clone(&outcome);
        let join = tokio::spawn(async move {
            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => flag.store(LOCAL_OK, Ordering::Release),
                Ok(Err(e)) => {
                    tracing::warn!(node = %name, error = %e, "in-process node failed");
                    flag.store(LOCAL_FAILED, Ordering::Release);
                }
                Err(_) => {
                    tracing::error!(node = %name, "in-process node panicked");
                    flag.store(LOCAL_FAILED, Ordering::Release);
                }
            }
        });

        Ok(Box::new(LocalHandle {
            token,
            join,
            outcome,
        }))
    }
}

struct LocalHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
    outcome: Arc<AtomicU8>,
}

impl NodeHandle for LocalHandle {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> Option<NodeExit> {
        if !self.join.is_finished() {
            return None;
        }
        // An aborted task never stores an outcome; it counts as a failure.
        let success = self.outcome.load(Ordering::Acquire) == LOCAL_OK;
        Some(NodeExit {
            success,
            code: None,
        })
    }

    fn terminate(&mut self) {
        self.token.cancel();
    }

    fn kill(&mut self) {
        self.join.abort();
    }
}

// ---------------------------
// Routing
// ---------------------------

/// Routes descriptors to the process or local spawner on `isolate`.
#[derive(Clone)]
pub struct DefaultSpawner {
    process: ProcessSpawner,
    local: LocalSpawner,
}

impl DefaultSpawner {
    pub fn new(local: LocalSpawner) -> Self {
        Self {
            process: ProcessSpawner,
            local,
        }
    }
}

#[async_trait]
impl Spawner for DefaultSpawner {
    async fn spawn(
        &self,
        descriptor: &NodeDescriptor,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn NodeHandle>, SpawnError> {
        if descriptor.isolate {
            self.process.spawn(descriptor, env).await
        } else {
            self.local.spawn(descriptor, env).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_with<F>(kind: &str, factory: F) -> LocalSpawner
    where
        F: Fn(NodeContext) -> NodeFuture + Send + Sync + 'static,
    {
        let mut spawner = LocalSpawner::new(MessageBus::default());
        spawner.register(kind, factory);
        spawner
    }

    async fn wait_exit(handle: &mut Box<dyn NodeHandle>) -> NodeExit {
        for _ in 0..200 {
            if let Some(exit) = handle.try_wait() {
                return exit;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("node did not exit in time");
    }

    #[tokio::test]
    async fn local_node_runs_to_success() {
        let spawner = local_with("oneshot", |_ctx| async { Ok(()) }.boxed());
        let d = NodeDescriptor::new("n", "oneshot").in_process();
        let mut handle = spawner.spawn(&d, &HashMap::new()).await.expect("spawns");
        assert_eq!(handle.pid(), None);
        let exit = wait_exit(&mut handle).await;
        assert!(exit.success);
    }

    #[tokio::test]
    async fn local_node_failure_is_reported() {
        let spawner = local_with("broken", |_ctx| {
            async { Err::<(), _>("boom".into()) }.boxed()
        });
        let d = NodeDescriptor::new("n", "broken").in_process();
        let mut handle = spawner.spawn(&d, &HashMap::new()).await.expect("spawns");
        let exit = wait_exit(&mut handle).await;
        assert!(!exit.success);
    }

    #[tokio::test]
    async fn local_node_panic_counts_as_failure() {
        let spawner = local_with("panicky", |_ctx| {
            async { panic!("unexpected") }.boxed()
        });
        let d = NodeDescriptor::new("n", "panicky").in_process();
        let mut handle = spawner.spawn(&d, &HashMap::new()).await.expect("spawns");
        let exit = wait_exit(&mut handle).await;
        assert!(!exit.success);
    }

    #[tokio::test]
    async fn terminate_cancels_local_node() {
        let spawner = local_with("waiter", |ctx: NodeContext| {
            async move {
                ctx.token.cancelled().await;
                Ok(())
            }
            .boxed()
        });
        let d = NodeDescriptor::new("n", "waiter").in_process();
        let mut handle = spawner.spawn(&d, &HashMap::new()).await.expect("spawns");
        assert!(handle.try_wait().is_none());

        handle.terminate();
        let exit = wait_exit(&mut handle).await;
        assert!(exit.success);
    }

    #[tokio::test]
    async fn unknown_kind_is_a_spawn_error() {
        let spawner = LocalSpawner::new(MessageBus::default());
        let d = NodeDescriptor::new("n", "ghost").in_process();
        let err = spawner.spawn(&d, &HashMap::new()).await.err().expect("fails");
        assert_eq!(err.as_label(), "spawn_unknown_kind");
    }

    #[tokio::test]
    async fn isolated_node_without_command_is_rejected() {
        let spawner = ProcessSpawner;
        let d = NodeDescriptor::new("n", "proc");
        let err = spawner.spawn(&d, &HashMap::new()).await.err().expect("fails");
        assert_eq!(err.as_label(), "spawn_missing_command");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_exit_code_is_observed() {
        let spawner = ProcessSpawner;
        let d = NodeDescriptor::new("n", "proc").with_command(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "exit 3".to_string(),
        ]);
        let mut handle = spawner.spawn(&d, &HashMap::new()).await.expect("spawns");
        let exit = wait_exit(&mut handle).await;
        assert!(!exit.success);
        assert_eq!(exit.code, Some(3));
    }
}
