//! Unit reconciler
//!
//! Drives one unit from its observed state to the declared one, or back to
//! its rollback snapshot on delete.
//!
//! ```text
//!   read:    lock ─► reload ─► query ─► unit-file state ─► snapshot (once)
//!   create:  lock ─► read ─► update(creating)
//!   update:  lock ─► reload ─► enable/disable ─► mask/unmask ─► start/stop/restart ─► read
//!   delete:  lock ─► reload ─► rollback enable ─► rollback start/stop ─► read
//! ```
//!
//! Every entry point holds the unit's lock for its whole duration and opens
//! its own manager session inside it.

mod actions;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;
use crate::dbus::{ClientError, Connector, ServiceManager, UnitStatus};
use crate::diag::{self, Diagnostics};
use crate::error::ReconcileError;
use crate::locks::{UnitGuard, UnitLocks};
use crate::resource::{Field, Observed, ResourceData, RollbackSnapshot};
use crate::state;

#[derive(Clone)]
pub struct Reconciler {
    connector: Arc<dyn Connector>,
    locks: Arc<UnitLocks>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(connector: Arc<dyn Connector>, locks: Arc<UnitLocks>, config: ReconcilerConfig) -> Self {
        Self {
            connector,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Refresh computed attributes from the manager
    pub async fn read(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Diagnostics {
        let unit = data.name().to_string();
        log::debug!("About to read {}", unit);

        let result: Result<(), ReconcileError> = async {
            let _guard = self.lock(&unit, cancel).await?;
            let sd = self.connect(data).await?;
            self.read_unlocked(sd.as_ref(), data).await
        }
        .await;

        self.report(data, result.err().into_iter().collect())
    }

    /// Bring a newly declared unit under management
    pub async fn create(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Diagnostics {
        let unit = data.name().to_string();
        log::debug!("About to create {}", unit);

        let mut errors = Vec::new();
        let result: Result<(), ReconcileError> = async {
            let _guard = self.lock(&unit, cancel).await?;
            let sd = self.connect(data).await?;
            self.read_unlocked(sd.as_ref(), data).await?;
            self.update_unlocked(sd.as_ref(), data, true, cancel, &mut errors).await
        }
        .await;
        if let Err(e) = result {
            errors.push(e);
        }

        let diags = self.report(data, errors);
        if !diag::has_errors(&diags) {
            data.commit();
        }
        diags
    }

    /// Converge a unit after its declaration changed
    pub async fn update(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Diagnostics {
        let unit = data.name().to_string();
        log::debug!("About to update {}", unit);

        let mut errors = Vec::new();
        let result: Result<(), ReconcileError> = async {
            let _guard = self.lock(&unit, cancel).await?;
            let sd = self.connect(data).await?;
            if data.state().rollback.is_none() {
                log::debug!("No rollback snapshot for {}, reading first", unit);
                self.read_unlocked(sd.as_ref(), data).await?;
            }
            self.update_unlocked(sd.as_ref(), data, false, cancel, &mut errors).await
        }
        .await;
        if let Err(e) = result {
            errors.push(e);
        }

        let diags = self.report(data, errors);
        if !diag::has_errors(&diags) {
            data.commit();
        }
        diags
    }

    /// Restore the rollback snapshot and forget the unit
    pub async fn delete(&self, data: &mut ResourceData, cancel: &CancellationToken) -> Diagnostics {
        let unit = data.name().to_string();
        log::debug!("About to delete {}", unit);

        let mut errors = Vec::new();
        let result: Result<(), ReconcileError> = async {
            let _guard = self.lock(&unit, cancel).await?;
            let sd = self.connect(data).await?;
            self.delete_unlocked(sd.as_ref(), data, cancel, &mut errors).await
        }
        .await;
        if let Err(e) = result {
            errors.push(e);
        }

        let diags = self.report(data, errors);
        if !diag::has_errors(&diags) {
            data.clear();
        }
        diags
    }

    async fn lock(&self, unit: &str, cancel: &CancellationToken) -> Result<UnitGuard, ReconcileError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReconcileError::LockCancelled(unit.to_string())),
            guard = self.locks.acquire(unit) => Ok(guard),
        }
    }

    async fn connect(&self, data: &ResourceData) -> Result<Box<dyn ServiceManager>, ReconcileError> {
        log::trace!("Connecting to {} manager for {}", data.declared().scope, data.name());
        self.connector
            .connect(data.declared().scope)
            .await
            .map_err(ReconcileError::Connect)
    }

    fn report(&self, data: &ResourceData, errors: Vec<ReconcileError>) -> Diagnostics {
        diag::with_severity(&errors, data.declared().ignore_errors)
    }

    async fn read_unlocked(
        &self,
        sd: &dyn ServiceManager,
        data: &mut ResourceData,
    ) -> Result<(), ReconcileError> {
        sd.reload().await.map_err(ReconcileError::Reload)?;

        let unit = data.name().to_string();
        let status = query(sd, &unit).await?;

        let st = data.state_mut();
        st.observed = Observed::from_status(&status);

        if status.load_state == state::NOT_FOUND {
            log::debug!("Unit {} not found", unit);
            st.id.clear();
            st.enable = None;
            st.mask = None;
            st.start = None;
            if st.rollback.is_none() {
                st.rollback = Some(RollbackSnapshot::absent(&status));
            }
            return Ok(());
        }

        st.id = status.name.clone();

        let unit_file_state = sd
            .get_unit_file_state(&status.name)
            .await
            .map_err(|source| ReconcileError::UnitFileState {
                unit: status.name.clone(),
                source,
            })?;

        let enablement = state::is_enabled(&unit_file_state);
        let active = state::is_active(&status.active_state);
        let masked = state::is_masked(&unit_file_state);
        st.observed.is_active = active;
        st.observed.is_enabled = enablement.enabled;
        st.observed.is_masked = masked;

        if st.rollback.is_none() {
            log::debug!(
                "Captured rollback for {}: active={} unit_file_state={}",
                unit,
                status.active_state,
                unit_file_state
            );
            st.rollback = Some(RollbackSnapshot::capture(&status, &unit_file_state));
        }

        st.start = Some(active);
        st.mask = Some(masked);
        if enablement.enableable {
            st.enable = Some(enablement.enabled);
        }

        Ok(())
    }

    async fn update_unlocked(
        &self,
        sd: &dyn ServiceManager,
        data: &mut ResourceData,
        creating: bool,
        cancel: &CancellationToken,
        advisories: &mut Vec<ReconcileError>,
    ) -> Result<(), ReconcileError> {
        let spec = data.declared().clone();
        let unit = spec.name.as_str();
        let rollback = data.state().rollback.clone();
        let restart = data.has_change(Field::RestartOn);

        sd.reload().await.map_err(ReconcileError::Reload)?;

        log::trace!(
            "Update {} creating={} enable={} mask={} start={} restart={} rollback={:?}",
            unit,
            creating,
            spec.enable,
            spec.mask,
            spec.start,
            restart,
            rollback.as_ref().map(RollbackSnapshot::to_map)
        );

        // Unset knobs fall back to the snapshot, and do nothing without one
        let step = match (spec.enable.value(), &rollback) {
            (Some(enable), _) if creating || data.has_change(Field::Enable) => {
                self.apply_enable(sd, unit, enable, false).await
            }
            (Some(_), _) | (None, None) => Ok(()),
            (None, Some(snapshot)) => self.apply_enable(sd, unit, snapshot.enabled, true).await,
        };
        tolerate(step, spec.ignore_errors, advisories)?;

        let step = match (spec.mask.value(), &rollback) {
            (Some(mask), _) if creating || data.has_change(Field::Mask) => {
                let target = if mask { state::MASKED } else { "" };
                self.apply_mask(sd, unit, target, false).await
            }
            (Some(_), _) | (None, None) => Ok(()),
            (None, Some(snapshot)) => {
                self.apply_mask(sd, unit, snapshot.mask_target(), true).await
            }
        };
        tolerate(step, spec.ignore_errors, advisories)?;

        let step = match (spec.start.value(), &rollback) {
            (Some(start), _) if creating || data.has_change(Field::Start) || restart => {
                self.apply_activate(sd, unit, start, restart, false, cancel).await
            }
            (Some(_), _) | (None, None) => Ok(()),
            (None, Some(snapshot)) => {
                self.apply_activate(sd, unit, snapshot.active, restart, true, cancel)
                    .await
            }
        };
        tolerate(step, spec.ignore_errors, advisories)?;

        self.read_unlocked(sd, data).await
    }

    async fn delete_unlocked(
        &self,
        sd: &dyn ServiceManager,
        data: &mut ResourceData,
        cancel: &CancellationToken,
        advisories: &mut Vec<ReconcileError>,
    ) -> Result<(), ReconcileError> {
        let unit = data.name().to_string();
        let ignore_errors = data.declared().ignore_errors;

        sd.reload().await.map_err(ReconcileError::Reload)?;

        // Unknown to the manager, or never observed: nothing to roll back
        let rollback = match data.state().rollback.clone() {
            Some(rollback) if !data.id().is_empty() => rollback,
            _ => {
                log::debug!("Deleted {} (no rollback)", unit);
                return Ok(());
            }
        };

        log::debug!("Rollback {} {}", state::enable_verb(rollback.enabled), unit);
        let step = self.apply_enable(sd, &unit, rollback.enabled, true).await;
        tolerate(step, ignore_errors, advisories)?;

        let restart = data.has_change(Field::RestartOn);
        log::debug!(
            "Rollback {} {} (restart: {})",
            state::start_verb(rollback.active),
            unit,
            restart
        );
        let step = self
            .apply_activate(sd, &unit, rollback.active, restart, true, cancel)
            .await;
        tolerate(step, ignore_errors, advisories)?;

        log::debug!("Read unit {} after rollback", unit);
        self.read_unlocked(sd, data).await
    }
}

/// Keep going past an action failure when the resource ignores errors
fn tolerate(
    step: Result<(), ReconcileError>,
    ignore_errors: bool,
    advisories: &mut Vec<ReconcileError>,
) -> Result<(), ReconcileError> {
    match step {
        Err(err) if ignore_errors && err.is_action() => {
            log::warn!("{} (ignored)", err);
            advisories.push(err);
            Ok(())
        }
        other => other,
    }
}

async fn query(sd: &dyn ServiceManager, unit: &str) -> Result<UnitStatus, ReconcileError> {
    let statuses = sd
        .list_by_names(&[unit])
        .await
        .map_err(|source| ReconcileError::Query {
            unit: unit.to_string(),
            source,
        })?;

    statuses
        .into_iter()
        .next()
        .ok_or_else(|| ReconcileError::NoStatus(unit.to_string()))
}

/// Client error for a manager that answered without a row for the unit
fn missing_status(unit: &str) -> ClientError {
    ClientError::Manager(format!("no status returned for {}", unit))
}
