//! Service manager client
//!
//! The reconciler talks to the service manager through the [`ServiceManager`]
//! trait. [`Connector`] opens one session per reconciliation, scoped to the
//! system or user manager.
//!
//! Key calls:
//! - Reload: re-read unit definitions (daemon-reload)
//! - ListUnitsByNames / GetUnitFileState: observe a unit
//! - Enable/Disable/Mask/UnmaskUnitFiles: change unit-file state
//! - Start/Stop/RestartUnit: queue a job, completed via JobRemoved

mod client;
mod proxy;

pub use client::{DbusConnector, DbusManager};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::JobMode;
use crate::resource::Scope;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("{0}")]
    Manager(String),

    #[error("job {0} was abandoned before completing")]
    JobAbandoned(String),
}

/// One row of ListUnitsByNames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub followed: String,
    pub path: String,
    pub job_id: u32,
    pub job_type: String,
    pub job_path: String,
}

/// One unit-file change reported by enable/disable/mask/unmask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFileChange {
    /// "symlink" or "unlink"
    pub kind: String,
    pub file: String,
    pub destination: String,
}

/// A queued start/stop/restart job.
///
/// Resolves to the terminal result string reported by the manager
/// ("done", "failed", "canceled", "timeout", ...).
#[derive(Debug)]
pub struct Job {
    path: String,
    completion: oneshot::Receiver<String>,
}

impl Job {
    pub fn new(path: impl Into<String>, completion: oneshot::Receiver<String>) -> Self {
        Self {
            path: path.into(),
            completion,
        }
    }

    /// Object path of the job
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the job's terminal result
    pub async fn wait(self) -> Result<String, ClientError> {
        self.completion
            .await
            .map_err(|_| ClientError::JobAbandoned(self.path))
    }
}

/// Operations the reconciler needs from the service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn reload(&self) -> Result<(), ClientError>;

    async fn list_by_names(&self, names: &[&str]) -> Result<Vec<UnitStatus>, ClientError>;

    async fn get_unit_file_state(&self, name: &str) -> Result<String, ClientError>;

    /// Returns (carries_install_info, changes)
    async fn enable(&self, name: &str) -> Result<(bool, Vec<UnitFileChange>), ClientError>;

    async fn disable(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError>;

    async fn mask(&self, name: &str, runtime: bool) -> Result<Vec<UnitFileChange>, ClientError>;

    async fn unmask(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError>;

    async fn start(&self, name: &str, mode: JobMode) -> Result<Job, ClientError>;

    async fn stop(&self, name: &str, mode: JobMode) -> Result<Job, ClientError>;

    async fn restart(&self, name: &str, mode: JobMode) -> Result<Job, ClientError>;
}

/// Opens a session with the system or user service manager
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, scope: Scope) -> Result<Box<dyn ServiceManager>, ClientError>;
}

/// Escape a unit name the way systemd escapes object path elements
/// e.g., "docker.service" -> "docker_2eservice"
///
/// Anything outside [A-Za-z0-9] is escaped byte by byte.
pub fn escape_unit_name(unit_id: &str) -> String {
    let mut escaped = String::with_capacity(unit_id.len());
    for b in unit_id.bytes() {
        if b.is_ascii_alphanumeric() {
            escaped.push(char::from(b));
        } else {
            escaped.push_str(&format!("_{:02x}", b));
        }
    }
    escaped
}
