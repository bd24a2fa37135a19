//! zbus-backed service manager session

use async_trait::async_trait;
use futures_lite::StreamExt;
use tokio::sync::oneshot;
use zbus::{connection::Builder, zvariant::OwnedObjectPath, Connection};

use super::proxy::{ChangeRow, JobRemovedStream, Systemd1ManagerProxy, UnitRow};
use super::{ClientError, Connector, Job, ServiceManager, UnitFileChange, UnitStatus};
use crate::config::JobMode;
use crate::resource::Scope;

/// Connects to systemd on the system bus, or the session bus for user units
#[derive(Debug, Default, Clone, Copy)]
pub struct DbusConnector;

#[async_trait]
impl Connector for DbusConnector {
    async fn connect(&self, scope: Scope) -> Result<Box<dyn ServiceManager>, ClientError> {
        Ok(Box::new(DbusManager::connect(scope).await?))
    }
}

/// One session with the service manager
pub struct DbusManager {
    proxy: Systemd1ManagerProxy<'static>,
}

impl DbusManager {
    pub async fn connect(scope: Scope) -> Result<Self, ClientError> {
        let connection: Connection = match scope {
            Scope::System => Builder::system()?.build().await?,
            Scope::User => Builder::session()?.build().await?,
        };
        log::debug!("Connected to {} service manager", scope);

        let proxy = Systemd1ManagerProxy::new(&connection).await?;
        proxy.subscribe().await?;

        Ok(Self { proxy })
    }

    /// Forward the JobRemoved result for `path` to the returned handle.
    ///
    /// The stream must be subscribed before the job is queued, or a fast job
    /// can complete before we listen.
    fn track(&self, path: OwnedObjectPath, mut stream: JobRemovedStream) -> Job {
        let (mut tx, rx) = oneshot::channel();
        let job_path = path.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Handle dropped (wait cancelled): stop listening
                    _ = tx.closed() => return,
                    signal = stream.next() => {
                        let Some(signal) = signal else {
                            log::debug!("JobRemoved stream ended before {} completed", path.as_str());
                            return;
                        };
                        let args = match signal.args() {
                            Ok(args) => args,
                            Err(e) => {
                                log::warn!("Malformed JobRemoved signal: {}", e);
                                continue;
                            }
                        };
                        if args.job().as_str() == path.as_str() {
                            log::trace!("Job {} ({}) finished: {}", args.id(), args.unit(), args.result());
                            let _ = tx.send(args.result().to_string());
                            return;
                        }
                    }
                }
            }
        });

        Job::new(job_path, rx)
    }
}

fn to_status(row: UnitRow) -> UnitStatus {
    let (name, description, load_state, active_state, sub_state, followed, path, job_id, job_type, job_path) = row;
    UnitStatus {
        name,
        description,
        load_state,
        active_state,
        sub_state,
        followed,
        path: path.to_string(),
        job_id,
        job_type,
        job_path: job_path.to_string(),
    }
}

fn to_changes(rows: Vec<ChangeRow>) -> Vec<UnitFileChange> {
    rows.into_iter()
        .map(|(kind, file, destination)| UnitFileChange {
            kind,
            file,
            destination,
        })
        .collect()
}

#[async_trait]
impl ServiceManager for DbusManager {
    async fn reload(&self) -> Result<(), ClientError> {
        Ok(self.proxy.reload().await?)
    }

    async fn list_by_names(&self, names: &[&str]) -> Result<Vec<UnitStatus>, ClientError> {
        let rows = self.proxy.list_units_by_names(names).await?;
        Ok(rows.into_iter().map(to_status).collect())
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, ClientError> {
        Ok(self.proxy.get_unit_file_state(name).await?)
    }

    async fn enable(&self, name: &str) -> Result<(bool, Vec<UnitFileChange>), ClientError> {
        let (carries_install_info, changes) = self.proxy.enable_unit_files(&[name], false, true).await?;
        Ok((carries_install_info, to_changes(changes)))
    }

    async fn disable(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError> {
        Ok(to_changes(self.proxy.disable_unit_files(&[name], false).await?))
    }

    async fn mask(&self, name: &str, runtime: bool) -> Result<Vec<UnitFileChange>, ClientError> {
        Ok(to_changes(self.proxy.mask_unit_files(&[name], runtime, true).await?))
    }

    async fn unmask(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError> {
        Ok(to_changes(self.proxy.unmask_unit_files(&[name], false).await?))
    }

    async fn start(&self, name: &str, mode: JobMode) -> Result<Job, ClientError> {
        let stream = self.proxy.receive_job_removed().await?;
        let path = self.proxy.start_unit(name, mode.as_str()).await?;
        Ok(self.track(path, stream))
    }

    async fn stop(&self, name: &str, mode: JobMode) -> Result<Job, ClientError> {
        let stream = self.proxy.receive_job_removed().await?;
        let path = self.proxy.stop_unit(name, mode.as_str()).await?;
        Ok(self.track(path, stream))
    }

    async fn restart(&self, name: &str, mode: JobMode) -> Result<Job, ClientError> {
        let stream = self.proxy.receive_job_removed().await?;
        let path = self.proxy.restart_unit(name, mode.as_str()).await?;
        Ok(self.track(path, stream))
    }
}
