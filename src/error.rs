//! Reconciliation errors

use std::fmt;
use std::time::Duration;

use crate::dbus::ClientError;

/// The verb an action attempted, e.g. "enable" or "rollback stop"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub verb: &'static str,
    /// Restoring the rollback snapshot rather than a declared value
    pub rollback: bool,
}

impl Attempt {
    pub fn declared(verb: &'static str) -> Self {
        Self {
            verb,
            rollback: false,
        }
    }

    pub fn rollback(verb: &'static str) -> Self {
        Self {
            verb,
            rollback: true,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rollback {
            write!(f, "rollback {}", self.verb)
        } else {
            f.write_str(self.verb)
        }
    }
}

/// Why an action did not succeed
#[derive(Debug, thiserror::Error)]
pub enum ActionFailure {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("job {job} finished with result '{result}'")]
    Job { job: String, result: String },

    #[error("job {job} did not finish within {timeout:?}")]
    Timeout { job: String, timeout: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("cannot connect to systemd: {0}")]
    Connect(#[source] ClientError),

    #[error("cannot reload systemd: {0}")]
    Reload(#[source] ClientError),

    #[error("cannot query unit {unit}: {source}")]
    Query {
        unit: String,
        #[source]
        source: ClientError,
    },

    #[error("cannot query unit {0}: no status returned")]
    NoStatus(String),

    #[error("cannot get unit file state for {unit}: {source}")]
    UnitFileState {
        unit: String,
        #[source]
        source: ClientError,
    },

    #[error("cannot {attempt} unit {unit}: {reason}")]
    Action {
        attempt: Attempt,
        unit: String,
        #[source]
        reason: ActionFailure,
    },

    #[error("cancelled while waiting to {attempt} unit {unit}")]
    Cancelled { attempt: Attempt, unit: String },

    #[error("cancelled while waiting for lock on unit {0}")]
    LockCancelled(String),
}

impl ReconcileError {
    pub fn action(attempt: Attempt, unit: &str, reason: impl Into<ActionFailure>) -> Self {
        Self::Action {
            attempt,
            unit: unit.to_string(),
            reason: reason.into(),
        }
    }

    /// Action errors are the only ones `ignore_errors` can downgrade
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::LockCancelled(_))
    }
}
