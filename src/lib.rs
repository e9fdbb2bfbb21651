//! # nodevisor
//!
//! **Nodevisor** is a configuration-driven orchestration runtime for a
//! fleet of worker nodes.
//!
//! It wires five cooperating subsystems around one message bus: nodes are
//! registered, started in dependency order, monitored, health-checked, and
//! restarted (or not) according to explicit policies and a centralized
//! error handler.
//!
//! ## Architecture
//! ```text
//!   NodeDescriptor   NodeDescriptor   NodeDescriptor      (parsed config)
//!        │                │                │
//!        ▼                ▼                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Launcher (phase machine)                                       │
//! │  INITIALIZING → DISCOVERING → VALIDATING → CREATING → STARTING  │
//! │  → RUNNING → STOPPING → STOPPED    (ERROR from any phase)       │
//! │                                                                 │
//! │  - Kahn toposort over `requires` edges (fail fast on cycles)    │
//! │  - Spawner seam: OS processes / in-process factory table        │
//! │  - ~1 Hz monitor loop + restart delay queue                     │
//! └───────┬───────────────┬────────────────┬──────────────┬─────────┘
//!         ▼               ▼                ▼              ▼
//!   NodeRegistry    HealthMonitor     ErrorHandler    MessageBus
//!   (status, deps,  (heartbeat        (severity,      (priority+TTL
//!    heartbeats,     timeout scan,     decision        pub/sub,
//!    topic index)    health score)     table,          request/reply,
//!         ▲               │             breakers)       retention)
//!         │               │                │              │
//!         └── heartbeats ─┴── reports ─────┴── publishes ─┘
//!                    system/{registry,heartbeat,health,errors}
//! ```
//!
//! ## Features
//! | Area           | Description                                              | Key types                                  |
//! |----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Bus**        | Priority/TTL pub-sub, request/response, retention.       | [`MessageBus`], [`Message`], [`Priority`]  |
//! | **Registry**   | Node lifecycle status, heartbeats, dependency index.     | [`NodeRegistry`], [`NodeRecord`]           |
//! | **Launcher**   | Ordered startup, supervision, idempotent shutdown.       | [`Launcher`], [`NodeDescriptor`]           |
//! | **Health**     | Heartbeat-timeout scan, weighted health score.           | [`HealthMonitor`], [`HealthReport`]        |
//! | **Recovery**   | Error classification, decision table, circuit breakers.  | [`ErrorHandler`], [`RecoveryAction`]       |
//! | **Policies**   | Restart/backoff/jitter knobs shared by the above.        | [`RestartPolicy`], [`BackoffPolicy`]       |
//!
//! ## Example
//! ```rust,no_run
//! use futures::FutureExt;
//! use nodevisor::{LauncherBuilder, NodeContext, NodeDescriptor, OrchestratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = LauncherBuilder::new(OrchestratorConfig::default())
//!         .with_factory("ticker", |ctx: NodeContext| {
//!             async move {
//!                 ctx.token.cancelled().await;
//!                 Ok(())
//!             }
//!             .boxed()
//!         })
//!         .with_descriptors(vec![
//!             NodeDescriptor::new("clock", "ticker").in_process(),
//!             NodeDescriptor::new("display", "ticker")
//!                 .in_process()
//!                 .with_requires(vec!["clock".into()]),
//!         ])
//!         .with_system_logging()
//!         .build()
//!         .await;
//!
//!     launcher.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod error;
mod health;
mod launcher;
mod policies;
mod recovery;
mod registry;
mod subscribers;

// ---- Public re-exports ----

pub use bus::{
    topics, BusStats, Message, MessageBus, MessageFilter, MessageHandler, MessageStream,
    Priority, SubscribeOptions,
};
pub use config::{BusConfig, OrchestratorConfig, RecoveryConfig};
pub use error::{BusError, ResolveError, RuntimeError, SpawnError};
pub use health::{HealthMonitor, HealthReport};
pub use launcher::{
    resolve_start_order, shutdown::wait_for_shutdown_signal, validate_manual_order,
    DefaultSpawner, GlobalOverrides, LaunchPhase, Launcher, LauncherBuilder, LocalSpawner,
    NodeContext, NodeDescriptor, NodeExit, NodeFactory, NodeFuture, NodeHandle, ProcessSpawner,
    Spawner,
};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use recovery::{
    BreakerState, CircuitBreaker, ErrorHandler, ErrorKind, ErrorRecord, ErrorReport,
    RecoveryAction, Severity,
};
pub use registry::{NodeRecord, NodeRegistry, NodeStatus, ResourceMetrics};
pub use subscribers::LogSubscriber;
