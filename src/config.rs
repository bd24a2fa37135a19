//! Reconciler configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a queued job interacts with jobs already pending for the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobMode {
    #[default]
    Replace,
    Fail,
    Isolate,
    IgnoreDependencies,
    IgnoreRequirements,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Fail => "fail",
            Self::Isolate => "isolate",
            Self::IgnoreDependencies => "ignore-dependencies",
            Self::IgnoreRequirements => "ignore-requirements",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "fail" => Ok(Self::Fail),
            "isolate" => Ok(Self::Isolate),
            "ignore-dependencies" => Ok(Self::IgnoreDependencies),
            "ignore-requirements" => Ok(Self::IgnoreRequirements),
            other => Err(format!(
                "invalid job mode '{}' (expected replace, fail, isolate, ignore-dependencies or ignore-requirements)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// Mode passed with every start/stop/restart
    pub job_mode: JobMode,
    /// Upper bound for a single job wait; None waits until the job completes
    /// or the operation is cancelled
    pub job_timeout: Option<Duration>,
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job_mode(mut self, mode: JobMode) -> Self {
        self.job_mode = mode;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }
}
