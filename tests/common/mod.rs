//! In-memory service manager for integration tests
//!
//! Records every call with the session that issued it, and can inject job
//! delays, job results, hung jobs and failures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use unitsync::dbus::{ClientError, Connector, Job, ServiceManager, UnitFileChange, UnitStatus};
use unitsync::resource::Scope;
use unitsync::{JobMode, Reconciler, ReconcilerConfig, UnitLocks};

/// Calls that change the unit (as opposed to reload/list/state queries)
pub const ACTION_OPS: &[&str] = &["enable", "disable", "mask", "unmask", "start", "stop", "restart"];

#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub unit_file_state: String,
    pre_mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub session: u32,
    pub op: &'static str,
    pub unit: String,
}

#[derive(Default)]
struct FakeState {
    units: HashMap<String, FakeUnit>,
    calls: Vec<Call>,
    job_delay: Duration,
    job_result: Option<String>,
    hang_jobs: bool,
    fail_reload: bool,
    fail_connect: bool,
    fail_ops: HashSet<&'static str>,
    pending: Vec<oneshot::Sender<String>>,
    next_session: u32,
    next_job: u32,
}

#[derive(Clone, Default)]
pub struct FakeSystemd {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSystemd {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    pub fn add_unit(&self, name: &str, active_state: &str, unit_file_state: &str) {
        let load_state = if unit_file_state.starts_with("masked") {
            "masked"
        } else {
            "loaded"
        };
        self.lock().units.insert(
            name.to_string(),
            FakeUnit {
                description: format!("Test unit {}", name),
                load_state: load_state.to_string(),
                active_state: active_state.to_string(),
                sub_state: sub_state_for(active_state).to_string(),
                unit_file_state: unit_file_state.to_string(),
                pre_mask: None,
            },
        );
    }

    pub fn remove_unit(&self, name: &str) {
        self.lock().units.remove(name);
    }

    pub fn set_active(&self, name: &str, active_state: &str) {
        let mut st = self.lock();
        let unit = st.units.get_mut(name).unwrap();
        unit.active_state = active_state.to_string();
        unit.sub_state = sub_state_for(active_state).to_string();
    }

    pub fn set_unit_file_state(&self, name: &str, unit_file_state: &str) {
        self.lock().units.get_mut(name).unwrap().unit_file_state = unit_file_state.to_string();
    }

    pub fn unit(&self, name: &str) -> FakeUnit {
        self.lock().units.get(name).cloned().unwrap()
    }

    pub fn set_job_delay(&self, delay: Duration) {
        self.lock().job_delay = delay;
    }

    pub fn set_job_result(&self, result: &str) {
        self.lock().job_result = Some(result.to_string());
    }

    /// Jobs are queued but never complete
    pub fn hang_jobs(&self) {
        self.lock().hang_jobs = true;
    }

    pub fn fail_reload(&self) {
        self.lock().fail_reload = true;
    }

    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    pub fn fail_op(&self, op: &'static str) {
        self.lock().fail_ops.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().fail_ops.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Action calls as "verb unit" strings, in order
    pub fn actions(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| ACTION_OPS.contains(&c.op))
            .map(|c| format!("{} {}", c.op, c.unit))
            .collect()
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(ReconcilerConfig::new(), Arc::new(UnitLocks::new()))
    }

    pub fn reconciler_with(&self, config: ReconcilerConfig, locks: Arc<UnitLocks>) -> Reconciler {
        Reconciler::new(Arc::new(self.clone()), locks, config)
    }
}

fn sub_state_for(active_state: &str) -> &'static str {
    match active_state {
        "active" => "running",
        "failed" => "failed",
        _ => "dead",
    }
}

#[async_trait]
impl Connector for FakeSystemd {
    async fn connect(&self, _scope: Scope) -> Result<Box<dyn ServiceManager>, ClientError> {
        let mut st = self.lock();
        if st.fail_connect {
            return Err(ClientError::Manager("Failed to connect to bus: No such file or directory".into()));
        }
        st.next_session += 1;
        let session = st.next_session;
        st.calls.push(Call {
            session,
            op: "connect",
            unit: String::new(),
        });
        Ok(Box::new(FakeSession {
            systemd: self.clone(),
            session,
        }))
    }
}

struct FakeSession {
    systemd: FakeSystemd,
    session: u32,
}

impl FakeSession {
    /// Record a call and fail it if requested
    fn record(&self, st: &mut FakeState, op: &'static str, unit: &str) -> Result<(), ClientError> {
        st.calls.push(Call {
            session: self.session,
            op,
            unit: unit.to_string(),
        });
        if st.fail_ops.contains(op) {
            return Err(ClientError::Manager(format!("{} {} refused", op, unit)));
        }
        Ok(())
    }

    fn unit_mut<'a>(st: &'a mut FakeState, name: &str) -> Result<&'a mut FakeUnit, ClientError> {
        st.units
            .get_mut(name)
            .ok_or_else(|| ClientError::Manager(format!("Unit file {} does not exist.", name)))
    }

    fn queue(&self, op: &'static str, unit: &str, target: &'static str) -> Result<Job, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, op, unit)?;

        let fake = Self::unit_mut(&mut st, unit)?;
        if fake.unit_file_state.starts_with("masked") && op != "stop" {
            return Err(ClientError::Manager(format!("Unit {} is masked.", unit)));
        }

        st.next_job += 1;
        let path = format!("/org/freedesktop/systemd1/job/{}", st.next_job);
        let (tx, rx) = oneshot::channel();

        if st.hang_jobs {
            st.pending.push(tx);
            return Ok(Job::new(path, rx));
        }

        let delay = st.job_delay;
        let result = st.job_result.clone().unwrap_or_else(|| "done".to_string());
        let systemd = self.systemd.clone();
        let unit = unit.to_string();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if result == "done" {
                let mut st = systemd.lock();
                if let Some(fake) = st.units.get_mut(&unit) {
                    fake.active_state = target.to_string();
                    fake.sub_state = sub_state_for(target).to_string();
                }
            }
            let _ = tx.send(result);
        });

        Ok(Job::new(path, rx))
    }
}

#[async_trait]
impl ServiceManager for FakeSession {
    async fn reload(&self) -> Result<(), ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "reload", "")?;
        if st.fail_reload {
            return Err(ClientError::Manager("Access denied".into()));
        }
        Ok(())
    }

    async fn list_by_names(&self, names: &[&str]) -> Result<Vec<UnitStatus>, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "list", names.first().copied().unwrap_or_default())?;
        Ok(names
            .iter()
            .map(|name| match st.units.get(*name) {
                Some(unit) => UnitStatus {
                    name: name.to_string(),
                    description: unit.description.clone(),
                    load_state: unit.load_state.clone(),
                    active_state: unit.active_state.clone(),
                    sub_state: unit.sub_state.clone(),
                    ..UnitStatus::default()
                },
                None => UnitStatus {
                    name: name.to_string(),
                    load_state: "not-found".into(),
                    active_state: "inactive".into(),
                    sub_state: "dead".into(),
                    ..UnitStatus::default()
                },
            })
            .collect())
    }

    async fn get_unit_file_state(&self, name: &str) -> Result<String, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "state", name)?;
        Ok(Self::unit_mut(&mut st, name)?.unit_file_state.clone())
    }

    async fn enable(&self, name: &str) -> Result<(bool, Vec<UnitFileChange>), ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "enable", name)?;
        Self::unit_mut(&mut st, name)?.unit_file_state = "enabled".into();
        Ok((
            true,
            vec![UnitFileChange {
                kind: "symlink".into(),
                file: format!("/etc/systemd/system/multi-user.target.wants/{}", name),
                destination: format!("/usr/lib/systemd/system/{}", name),
            }],
        ))
    }

    async fn disable(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "disable", name)?;
        Self::unit_mut(&mut st, name)?.unit_file_state = "disabled".into();
        Ok(vec![UnitFileChange {
            kind: "unlink".into(),
            file: format!("/etc/systemd/system/multi-user.target.wants/{}", name),
            destination: String::new(),
        }])
    }

    async fn mask(&self, name: &str, runtime: bool) -> Result<Vec<UnitFileChange>, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "mask", name)?;
        let unit = Self::unit_mut(&mut st, name)?;
        if !unit.unit_file_state.starts_with("masked") {
            unit.pre_mask = Some(unit.unit_file_state.clone());
        }
        unit.unit_file_state = if runtime { "masked-runtime" } else { "masked" }.into();
        unit.load_state = "masked".into();
        Ok(Vec::new())
    }

    async fn unmask(&self, name: &str) -> Result<Vec<UnitFileChange>, ClientError> {
        let mut st = self.systemd.lock();
        self.record(&mut st, "unmask", name)?;
        let unit = Self::unit_mut(&mut st, name)?;
        unit.unit_file_state = unit.pre_mask.take().unwrap_or_else(|| "disabled".into());
        unit.load_state = "loaded".into();
        Ok(Vec::new())
    }

    async fn start(&self, name: &str, _mode: JobMode) -> Result<Job, ClientError> {
        self.queue("start", name, "active")
    }

    async fn stop(&self, name: &str, _mode: JobMode) -> Result<Job, ClientError> {
        self.queue("stop", name, "inactive")
    }

    async fn restart(&self, name: &str, _mode: JobMode) -> Result<Job, ClientError> {
        self.queue("restart", name, "active")
    }
}
