//! Diagnostics returned by lifecycle operations

use std::fmt;

use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.summary),
            Severity::Warning => write!(f, "warning: {}", self.summary),
        }
    }
}

pub type Diagnostics = Vec<Diagnostic>;

/// Turn collected errors into diagnostics.
///
/// With `ignore_errors`, action errors become warnings. Connection, reload,
/// query and cancellation errors are always reported as errors.
pub fn with_severity(errors: &[ReconcileError], ignore_errors: bool) -> Diagnostics {
    errors
        .iter()
        .map(|err| Diagnostic {
            severity: if ignore_errors && err.is_action() {
                Severity::Warning
            } else {
                Severity::Error
            },
            summary: err.to_string(),
        })
        .collect()
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}
