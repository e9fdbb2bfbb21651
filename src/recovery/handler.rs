//! Centralized error classification and recovery decisions.
//!
//! Every component reports failures here instead of deciding locally what
//! to do about them. [`ErrorHandler::handle_error`] classifies the report,
//! applies a fixed decision table, consults the node's circuit breaker and
//! returns an explicit [`RecoveryAction`] for the caller to carry out.
//!
//! ## Decision table
//! ```text
//! CRITICAL  memory            restart_system
//! CRITICAL  permission        shutdown
//! CRITICAL  anything else     shutdown
//! HIGH      retries < 3       retry (exponential backoff)
//! HIGH      retries >= 3      restart_node
//! MEDIUM    retries < 2       retry
//! MEDIUM    retries >= 2      ignore
//! LOW       always            ignore
//! ```
//! An open breaker downgrades node-level actions (retry, restart_node) to
//! [`RecoveryAction::Suspend`]; system-level actions pass through.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::bus::{topics, Message, MessageBus, Priority};
use crate::config::RecoveryConfig;

use super::breaker::{BreakerState, CircuitBreaker};

/// Broad class of a reported failure, used for severity classification and
/// retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Permission,
    Memory,
    Value,
    Parse,
    Crash,
    Unknown,
}

impl ErrorKind {
    /// Default severity when the reporter does not override it.
    pub fn classify(&self) -> Severity {
        match self {
            ErrorKind::Memory | ErrorKind::Permission => Severity::Critical,
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Crash => Severity::High,
            ErrorKind::Value | ErrorKind::Parse => Severity::Medium,
            ErrorKind::Unknown => Severity::Low,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permission => "permission",
            ErrorKind::Memory => "memory",
            ErrorKind::Value => "value",
            ErrorKind::Parse => "parse",
            ErrorKind::Crash => "crash",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Severity of a reported failure. Ordered, so `>=` comparisons work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severe failures feed the circuit breaker.
    pub fn is_severe(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// What the caller should do about a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Log and move on.
    Ignore,
    /// Try the failed operation again after the delay.
    Retry { delay: std::time::Duration },
    /// Restart the offending node process.
    RestartNode,
    /// Tear the whole system down and start it again.
    RestartSystem,
    /// Stop the system; the condition is not recoverable.
    Shutdown,
    /// The node's breaker is open; take no automatic action.
    Suspend,
}

impl RecoveryAction {
    pub fn as_label(&self) -> &'static str {
        match self {
            RecoveryAction::Ignore => "ignore",
            RecoveryAction::Retry { .. } => "retry",
            RecoveryAction::RestartNode => "restart_node",
            RecoveryAction::RestartSystem => "restart_system",
            RecoveryAction::Shutdown => "shutdown",
            RecoveryAction::Suspend => "suspend",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One handled failure, kept in a bounded history.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub id: u64,
    pub at: SystemTime,
    pub node: String,
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    pub context: BTreeMap<String, String>,
    pub action: RecoveryAction,
    pub retry_count: u32,
    pub resolved: bool,
}

/// The decision returned to the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    pub id: u64,
    pub severity: Severity,
    pub action: RecoveryAction,
}

struct HandlerState {
    records: VecDeque<ErrorRecord>,
    /// (node, kind) → consecutive retry count.
    retries: HashMap<(String, ErrorKind), u32>,
    breakers: HashMap<String, CircuitBreaker>,
    next_id: u64,
}

/// Shared error handler. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ErrorHandler {
    state: Arc<Mutex<HandlerState>>,
    config: RecoveryConfig,
    bus: Option<MessageBus>,
}

impl ErrorHandler {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandlerState {
                records: VecDeque::new(),
                retries: HashMap::new(),
                breakers: HashMap::new(),
                next_id: 1,
            })),
            config,
            bus: None,
        }
    }

    /// Handler that also publishes each decision to [`topics::ERRORS`].
    pub fn with_bus(config: RecoveryConfig, bus: MessageBus) -> Self {
        let mut handler = Self::new(config);
        handler.bus = Some(bus);
        handler
    }

    /// Classifies a failure, decides on a recovery action and records it.
    ///
    /// `severity` overrides the kind-based classification when given.
    pub fn handle_error(
        &self,
        node: &str,
        kind: ErrorKind,
        message: &str,
        context: Option<BTreeMap<String, String>>,
        severity: Option<Severity>,
    ) -> ErrorReport {
        let now = Instant::now();
        let severity = severity.unwrap_or_else(|| kind.classify());
        let key = (node.to_string(), kind);

        let (report, retry_count) = {
            let mut state = self.lock_state();
            let retry_count = state.retries.get(&key).copied().unwrap_or(0);
            let mut action = self.decide(severity, kind, retry_count);

            if severity.is_severe() {
                let breaker = state
                    .breakers
                    .entry(node.to_string())
                    .or_insert_with(|| self.new_breaker());
                breaker.record_failure(now);
            }
            if matches!(
                action,
                RecoveryAction::Retry { .. } | RecoveryAction::RestartNode
            ) {
                let allowed = state
                    .breakers
                    .get_mut(node)
                    .map(|b| b.allows(now))
                    .unwrap_or(true);
                if !allowed {
                    action = RecoveryAction::Suspend;
                }
            }
            if matches!(action, RecoveryAction::Retry { .. }) {
                *state.retries.entry(key).or_insert(0) += 1;
            }

            let id = state.next_id;
            state.next_id += 1;
            state.records.push_back(ErrorRecord {
                id,
                at: SystemTime::now(),
                node: node.to_string(),
                kind,
                message: message.to_string(),
                severity,
                context: context.unwrap_or_default(),
                action,
                retry_count,
                resolved: false,
            });
            while state.records.len() > self.config.max_records {
                state.records.pop_front();
            }

            (
                ErrorReport {
                    id,
                    severity,
                    action,
                },
                retry_count,
            )
        };

        match severity {
            Severity::Critical | Severity::High => tracing::error!(
                node,
                kind = kind.as_label(),
                severity = severity.as_label(),
                action = report.action.as_label(),
                retries = retry_count,
                message,
                "failure handled"
            ),
            Severity::Medium => tracing::warn!(
                node,
                kind = kind.as_label(),
                action = report.action.as_label(),
                message,
                "failure handled"
            ),
            Severity::Low => tracing::debug!(
                node,
                kind = kind.as_label(),
                message,
                "failure handled"
            ),
        }
        self.publish_report(node, kind, message, &report);
        report
    }

    /// Marks a record resolved and clears the retry counter for its
    /// (node, kind) pair. Returns `false` for an unknown id.
    pub fn resolve(&self, error_id: u64) -> bool {
        let mut state = self.lock_state();
        let Some(record) = state.records.iter_mut().find(|r| r.id == error_id) else {
            return false;
        };
        record.resolved = true;
        let key = (record.node.clone(), record.kind);
        state.retries.remove(&key);
        true
    }

    /// Records that a recovery attempt for `node` succeeded.
    ///
    /// Clears the node's retry counters and feeds the breaker, closing a
    /// half-open one.
    pub fn record_recovery_success(&self, node: &str) {
        let mut state = self.lock_state();
        state.retries.retain(|(n, _), _| n != node);
        if let Some(breaker) = state.breakers.get_mut(node) {
            breaker.record_success(Instant::now());
        }
    }

    /// Whether automatic recovery for `node` is currently allowed.
    ///
    /// Read-only: polling this never consumes the breaker's half-open
    /// trial. Use [`begin_recovery`](Self::begin_recovery) to claim it.
    pub fn recovery_allowed(&self, node: &str) -> bool {
        let state = self.lock_state();
        state
            .breakers
            .get(node)
            .map(|b| b.would_allow(Instant::now()))
            .unwrap_or(true)
    }

    /// Claims a recovery attempt for `node`.
    ///
    /// Returns whether the attempt may proceed. An open breaker whose
    /// timeout has elapsed grants (and consumes) its single half-open
    /// trial here; the outcome is reported back through
    /// [`record_recovery_success`](Self::record_recovery_success) or the
    /// next failure report.
    pub fn begin_recovery(&self, node: &str) -> bool {
        let mut state = self.lock_state();
        state
            .breakers
            .get_mut(node)
            .map(|b| b.allows(Instant::now()))
            .unwrap_or(true)
    }

    pub fn breaker_state(&self, node: &str) -> Option<BreakerState> {
        self.lock_state().breakers.get(node).map(|b| b.state())
    }

    pub fn retry_count(&self, node: &str, kind: ErrorKind) -> u32 {
        self.lock_state()
            .retries
            .get(&(node.to_string(), kind))
            .copied()
            .unwrap_or(0)
    }

    /// Cloned records for one node, oldest first.
    pub fn errors_for(&self, node: &str) -> Vec<ErrorRecord> {
        self.lock_state()
            .records
            .iter()
            .filter(|r| r.node == node)
            .cloned()
            .collect()
    }

    /// The most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.lock_state();
        let skip = state.records.len().saturating_sub(limit);
        state.records.iter().skip(skip).cloned().collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.lock_state()
            .records
            .iter()
            .filter(|r| !r.resolved)
            .count()
    }

    fn decide(&self, severity: Severity, kind: ErrorKind, retries: u32) -> RecoveryAction {
        match severity {
            Severity::Critical => match kind {
                ErrorKind::Memory => RecoveryAction::RestartSystem,
                _ => RecoveryAction::Shutdown,
            },
            Severity::High => {
                if retries < 3 {
                    RecoveryAction::Retry {
                        delay: self.config.retry_backoff.next(retries),
                    }
                } else {
                    RecoveryAction::RestartNode
                }
            }
            Severity::Medium => {
                if retries < 2 {
                    RecoveryAction::Retry {
                        delay: self.config.retry_backoff.next(retries),
                    }
                } else {
                    RecoveryAction::Ignore
                }
            }
            Severity::Low => RecoveryAction::Ignore,
        }
    }

    fn new_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.config.failure_window,
            self.config.failure_threshold,
            self.config.open_timeout,
        )
    }

    fn publish_report(&self, node: &str, kind: ErrorKind, message: &str, report: &ErrorReport) {
        if let Some(bus) = &self.bus {
            let payload = topics::ErrorPayload {
                id: report.id,
                node: node.to_string(),
                kind: kind.as_label().to_string(),
                severity: report.severity,
                message: message.to_string(),
                action: report.action.as_label().to_string(),
            };
            bus.publish(
                Message::new(topics::ERRORS, "recovery", topics::to_value(&payload))
                    .with_priority(Priority::High),
            );
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, HandlerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handler() -> ErrorHandler {
        ErrorHandler::new(RecoveryConfig::default())
    }

    #[test]
    fn classification_follows_kind() {
        assert_eq!(ErrorKind::Memory.classify(), Severity::Critical);
        assert_eq!(ErrorKind::Permission.classify(), Severity::Critical);
        assert_eq!(ErrorKind::Connection.classify(), Severity::High);
        assert_eq!(ErrorKind::Timeout.classify(), Severity::High);
        assert_eq!(ErrorKind::Crash.classify(), Severity::High);
        assert_eq!(ErrorKind::Value.classify(), Severity::Medium);
        assert_eq!(ErrorKind::Parse.classify(), Severity::Medium);
        assert_eq!(ErrorKind::Unknown.classify(), Severity::Low);
    }

    #[test]
    fn critical_memory_restarts_system_other_critical_shuts_down() {
        let h = handler();
        let report = h.handle_error("db", ErrorKind::Memory, "oom", None, None);
        assert_eq!(report.action, RecoveryAction::RestartSystem);

        let report = h.handle_error("db", ErrorKind::Permission, "denied", None, None);
        assert_eq!(report.action, RecoveryAction::Shutdown);

        let report =
            h.handle_error("db", ErrorKind::Crash, "bad", None, Some(Severity::Critical));
        assert_eq!(report.action, RecoveryAction::Shutdown);
    }

    #[test]
    fn high_retries_three_times_then_restarts_node() {
        let h = handler();
        for attempt in 0..3u32 {
            let report = h.handle_error("cam", ErrorKind::Connection, "refused", None, None);
            match report.action {
                RecoveryAction::Retry { delay } => {
                    assert_eq!(
                        delay,
                        h.config.retry_backoff.next(attempt),
                        "attempt {attempt}"
                    );
                }
                other => panic!("attempt {attempt}: expected retry, got {other}"),
            }
        }
        let report = h.handle_error("cam", ErrorKind::Connection, "refused", None, None);
        assert_eq!(report.action, RecoveryAction::RestartNode);
    }

    #[test]
    fn medium_retries_twice_then_ignores() {
        let h = handler();
        for _ in 0..2 {
            let report = h.handle_error("calib", ErrorKind::Value, "range", None, None);
            assert!(matches!(report.action, RecoveryAction::Retry { .. }));
        }
        let report = h.handle_error("calib", ErrorKind::Value, "range", None, None);
        assert_eq!(report.action, RecoveryAction::Ignore);
    }

    #[test]
    fn low_is_always_ignored() {
        let h = handler();
        for _ in 0..5 {
            let report = h.handle_error("misc", ErrorKind::Unknown, "noise", None, None);
            assert_eq!(report.action, RecoveryAction::Ignore);
        }
    }

    #[test]
    fn retry_counters_are_keyed_per_node_and_kind() {
        let h = handler();
        for _ in 0..3 {
            h.handle_error("a", ErrorKind::Connection, "x", None, None);
        }
        // Different node and different kind both start fresh.
        let report = h.handle_error("b", ErrorKind::Connection, "x", None, None);
        assert!(matches!(report.action, RecoveryAction::Retry { .. }));
        let report = h.handle_error("a", ErrorKind::Timeout, "x", None, None);
        assert!(matches!(report.action, RecoveryAction::Retry { .. }));
    }

    #[test]
    fn breaker_suspends_node_level_recovery() {
        let mut config = RecoveryConfig::default();
        config.failure_threshold = 3;
        let h = ErrorHandler::new(config);

        h.handle_error("gps", ErrorKind::Connection, "x", None, None);
        h.handle_error("gps", ErrorKind::Connection, "x", None, None);
        assert_eq!(h.breaker_state("gps"), Some(BreakerState::Closed));

        // Third severe failure trips the breaker; the decision is suspended.
        let report = h.handle_error("gps", ErrorKind::Connection, "x", None, None);
        assert_eq!(report.action, RecoveryAction::Suspend);
        assert_eq!(h.breaker_state("gps"), Some(BreakerState::Open));
        assert!(!h.recovery_allowed("gps"));

        // System-level decisions pass through an open breaker.
        let report = h.handle_error("gps", ErrorKind::Memory, "oom", None, None);
        assert_eq!(report.action, RecoveryAction::RestartSystem);
    }

    #[test]
    fn open_breaker_grants_half_open_trial_after_timeout() {
        let mut config = RecoveryConfig::default();
        config.failure_threshold = 2;
        config.open_timeout = Duration::from_millis(50);
        let h = ErrorHandler::new(config);

        h.handle_error("imu", ErrorKind::Connection, "x", None, None);
        let report = h.handle_error("imu", ErrorKind::Connection, "x", None, None);
        assert_eq!(report.action, RecoveryAction::Suspend);
        assert_eq!(h.breaker_state("imu"), Some(BreakerState::Open));

        std::thread::sleep(Duration::from_millis(120));

        // A fresh severe failure after the open timeout takes the trial
        // instead of being suspended again.
        let report = h.handle_error("imu", ErrorKind::Connection, "x", None, None);
        assert!(matches!(report.action, RecoveryAction::Retry { .. }));
        assert_eq!(h.breaker_state("imu"), Some(BreakerState::HalfOpen));

        h.record_recovery_success("imu");
        assert_eq!(h.breaker_state("imu"), Some(BreakerState::Closed));
    }

    #[test]
    fn recovery_allowed_is_a_peek_and_begin_recovery_claims_the_trial() {
        let mut config = RecoveryConfig::default();
        config.failure_threshold = 2;
        config.open_timeout = Duration::from_millis(10);
        let h = ErrorHandler::new(config);

        h.handle_error("imu", ErrorKind::Connection, "x", None, None);
        h.handle_error("imu", ErrorKind::Connection, "x", None, None);
        std::thread::sleep(Duration::from_millis(30));

        // Polling the query repeatedly must not eat the trial.
        assert!(h.recovery_allowed("imu"));
        assert!(h.recovery_allowed("imu"));
        assert_eq!(h.breaker_state("imu"), Some(BreakerState::Open));

        assert!(h.begin_recovery("imu"));
        assert_eq!(h.breaker_state("imu"), Some(BreakerState::HalfOpen));
        // The claimed trial blocks further attempts until its outcome lands.
        assert!(!h.recovery_allowed("imu"));
        assert!(!h.begin_recovery("imu"));
    }

    #[test]
    fn resolve_clears_retry_counter() {
        let h = handler();
        let report = h.handle_error("cam", ErrorKind::Connection, "x", None, None);
        assert_eq!(h.retry_count("cam", ErrorKind::Connection), 1);

        assert!(h.resolve(report.id));
        assert_eq!(h.retry_count("cam", ErrorKind::Connection), 0);
        assert!(!h.resolve(9999));

        let records = h.errors_for("cam");
        assert_eq!(records.len(), 1);
        assert!(records[0].resolved);
    }

    #[test]
    fn recovery_success_clears_node_retries() {
        let h = handler();
        h.handle_error("cam", ErrorKind::Connection, "x", None, None);
        h.handle_error("cam", ErrorKind::Value, "y", None, None);
        h.record_recovery_success("cam");
        assert_eq!(h.retry_count("cam", ErrorKind::Connection), 0);
        assert_eq!(h.retry_count("cam", ErrorKind::Value), 0);
    }

    #[test]
    fn history_is_bounded() {
        let mut config = RecoveryConfig::default();
        config.max_records = 3;
        let h = ErrorHandler::new(config);
        for i in 0..5 {
            h.handle_error("n", ErrorKind::Unknown, &format!("e{i}"), None, None);
        }
        let recent = h.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "e2");
        assert_eq!(recent[2].message, "e4");
    }

    #[test]
    fn context_is_stored_with_the_record() {
        let h = handler();
        let mut ctx = BTreeMap::new();
        ctx.insert("pid".to_string(), "4242".to_string());
        h.handle_error("cam", ErrorKind::Crash, "exit 139", Some(ctx), None);
        let records = h.errors_for("cam");
        assert_eq!(records[0].context.get("pid").map(String::as_str), Some("4242"));
        assert_eq!(records[0].retry_count, 0);
    }
}
