//! Error types used across the nodevisor runtime.
//!
//! This module centralizes the error enums raised at the crate's API
//! boundaries:
//!
//! - [`RuntimeError`] — failures of the orchestration runtime itself
//!   (startup, dependency resolution, spawning).
//! - [`BusError`] — failures of message-bus operations that cannot be
//!   expressed as a plain `bool` (request/response).
//! - [`ResolveError`] — configuration-level dependency-graph failures.
//!   These are fatal at startup and are never retried.
//! - [`SpawnError`] — failures producing a node handle from a descriptor.
//!
//! All types provide `as_label()` returning a short stable snake_case label
//! for logs and metrics.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the orchestration runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Dependency resolution failed; startup is aborted before any node runs.
    #[error("dependency resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// A node could not be spawned during the CREATING/STARTING phase.
    #[error("failed to spawn node '{node}': {source}")]
    Spawn {
        /// Name of the node that failed to spawn.
        node: String,
        #[source]
        source: SpawnError,
    },

    /// `start()` was invoked while the launcher is not in a startable phase.
    #[error("launcher already started (phase: {phase})")]
    AlreadyStarted {
        /// Phase the launcher was in when `start()` was called.
        phase: String,
    },

    /// Waiting for a termination signal failed at the OS level.
    #[error("signal handler registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Resolve(_) => "runtime_resolve_failed",
            RuntimeError::Spawn { .. } => "runtime_spawn_failed",
            RuntimeError::AlreadyStarted { .. } => "runtime_already_started",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }
}

/// Errors produced by dependency resolution over node descriptors.
///
/// Every variant is a configuration error: fatal, reported immediately,
/// never silently skipped.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A descriptor requires a node that no descriptor defines.
    #[error("node '{node}' requires unknown node '{dependency}'")]
    MissingDependency {
        /// The node whose `requires` list is broken.
        node: String,
        /// The dependency name that could not be found.
        dependency: String,
    },

    /// The dependency graph contains a cycle; `members` lists every node
    /// that could not be ordered (the cyclic set and its downstream), sorted.
    #[error("dependency cycle involving nodes: {members:?}")]
    Cycle {
        /// Nodes that could not be ordered.
        members: Vec<String>,
    },

    /// A manual start-order override does not cover exactly the node set.
    #[error("manual start order mismatch; missing: {missing:?}, unknown: {unknown:?}")]
    OrderMismatch {
        /// Nodes defined by descriptors but absent from the override.
        missing: Vec<String>,
        /// Names in the override that match no descriptor.
        unknown: Vec<String>,
    },
}

impl ResolveError {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolveError::MissingDependency { .. } => "resolve_missing_dependency",
            ResolveError::Cycle { .. } => "resolve_cycle",
            ResolveError::OrderMismatch { .. } => "resolve_order_mismatch",
        }
    }
}

/// Errors produced by bus request/response operations.
///
/// Plain publish/subscribe paths report failure through booleans and
/// counters (no error propagation across the bus boundary); only the
/// synchronous `request()` path needs a typed error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// No response arrived within the caller-supplied timeout.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The request message was rejected at publish time (invalid message or
    /// full delivery queue).
    #[error("request rejected at publish: {reason}")]
    Rejected {
        /// Why the publish was refused.
        reason: &'static str,
    },

    /// The reply stream closed before a response arrived (bus stopped).
    #[error("bus closed while waiting for reply")]
    Closed,
}

impl BusError {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::RequestTimeout { .. } => "bus_request_timeout",
            BusError::Rejected { .. } => "bus_request_rejected",
            BusError::Closed => "bus_closed",
        }
    }
}

/// Errors produced while creating a node handle from a descriptor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The descriptor's `kind` matches no registered in-process factory.
    #[error("no factory registered for node kind '{kind}'")]
    UnknownKind {
        /// The unmatched node-type key.
        kind: String,
    },

    /// An isolated node has no command line to execute.
    #[error("node '{node}' is isolated but has no command")]
    MissingCommand {
        /// Name of the misconfigured node.
        node: String,
    },

    /// The OS process could not be created.
    #[error("process creation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::UnknownKind { .. } => "spawn_unknown_kind",
            SpawnError::MissingCommand { .. } => "spawn_missing_command",
            SpawnError::Io(_) => "spawn_io",
        }
    }
}
