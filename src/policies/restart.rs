//! Restart policies for supervised node processes.
//!
//! [`RestartPolicy`] determines whether a node is restarted after its
//! process exits, before `max_restarts` accounting is applied.
//!
//! - [`RestartPolicy::Never`] the node runs once and is never restarted.
//! - [`RestartPolicy::OnFailure`] restart only after a non-zero exit (default).
//! - [`RestartPolicy::Always`] restart unconditionally after any exit.
//!
//! The policy decides *eligibility* only; the launcher additionally enforces
//! the descriptor's `max_restarts` budget and the node's circuit breaker.

use serde::{Deserialize, Serialize};

/// Policy controlling whether a node is restarted after its process exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Never restart: the node runs once and exits permanently.
    Never,
    /// Restart only when the process exited with failure (default).
    #[default]
    OnFailure,
    /// Restart unconditionally after every exit, clean or not.
    Always,
}

impl RestartPolicy {
    /// Whether this policy permits a restart given how the process exited.
    #[inline]
    pub fn allows(&self, exit_success: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => !exit_success,
            RestartPolicy::Always => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_blocks_both_outcomes() {
        assert!(!RestartPolicy::Never.allows(true));
        assert!(!RestartPolicy::Never.allows(false));
    }

    #[test]
    fn on_failure_only_restarts_failures() {
        assert!(!RestartPolicy::OnFailure.allows(true));
        assert!(RestartPolicy::OnFailure.allows(false));
    }

    #[test]
    fn always_restarts_both_outcomes() {
        assert!(RestartPolicy::Always.allows(true));
        assert!(RestartPolicy::Always.allows(false));
    }
}
