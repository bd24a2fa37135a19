//! Enable, mask and activate actions
//!
//! Each action re-reads the bit of state it is about to change and skips the
//! manager call when the unit is already where it should be.

use tokio_util::sync::CancellationToken;

use super::{missing_status, Reconciler};
use crate::dbus::{Job, ServiceManager, UnitFileChange};
use crate::error::{ActionFailure, Attempt, ReconcileError};
use crate::state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Start,
    Stop,
    Restart,
}

impl JobKind {
    fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl Reconciler {
    /// Enable or disable a unit, skipping units whose state can't be toggled
    pub(super) async fn apply_enable(
        &self,
        sd: &dyn ServiceManager,
        unit: &str,
        enable: bool,
        rollback: bool,
    ) -> Result<(), ReconcileError> {
        let attempt = Attempt {
            verb: state::enable_verb(enable),
            rollback,
        };
        let unit_file_state = sd
            .get_unit_file_state(unit)
            .await
            .map_err(|e| ReconcileError::action(attempt, unit, e))?;
        let current = state::is_enabled(&unit_file_state);

        if current.enableable && !current.enabled && enable {
            log::trace!("Enable {} (state={})", unit, unit_file_state);
            let (carries_install_info, changes) = sd
                .enable(unit)
                .await
                .map_err(|e| ReconcileError::action(attempt, unit, e))?;
            if !carries_install_info {
                log::debug!("Unit {} has no [Install] section", unit);
            }
            log_changes(unit, &changes);
        } else if current.enableable && current.enabled && !enable {
            log::trace!("Disable {} (state={})", unit, unit_file_state);
            let changes = sd
                .disable(unit)
                .await
                .map_err(|e| ReconcileError::action(attempt, unit, e))?;
            log_changes(unit, &changes);
        } else {
            log::trace!(
                "Do not {} {} (state={}, enabled={}, enableable={})",
                attempt,
                unit,
                unit_file_state,
                current.enabled,
                current.enableable
            );
        }

        Ok(())
    }

    /// Move a unit's mask to `target`: "masked", "masked-runtime", or "" for unmasked
    pub(super) async fn apply_mask(
        &self,
        sd: &dyn ServiceManager,
        unit: &str,
        target: &str,
        rollback: bool,
    ) -> Result<(), ReconcileError> {
        let want = state::is_masked(target);
        let attempt = Attempt {
            verb: state::mask_verb(want),
            rollback,
        };
        let unit_file_state = sd
            .get_unit_file_state(unit)
            .await
            .map_err(|e| ReconcileError::action(attempt, unit, e))?;

        if want && target != unit_file_state {
            log::trace!("Mask ({}) {} (state={})", target, unit, unit_file_state);
            let changes = sd
                .mask(unit, target == state::MASKED_RUNTIME)
                .await
                .map_err(|e| ReconcileError::action(attempt, unit, e))?;
            log_changes(unit, &changes);
        } else if !want && state::is_masked(&unit_file_state) {
            log::trace!("Unmask {} (state={})", unit, unit_file_state);
            let changes = sd
                .unmask(unit)
                .await
                .map_err(|e| ReconcileError::action(attempt, unit, e))?;
            log_changes(unit, &changes);
        } else {
            log::trace!("Do not {} {} (state={})", attempt, unit, unit_file_state);
        }

        Ok(())
    }

    /// Start, stop or restart a unit and wait for the job.
    ///
    /// `restart` forces a restart job when the unit should be active, even if
    /// it already is.
    pub(super) async fn apply_activate(
        &self,
        sd: &dyn ServiceManager,
        unit: &str,
        start: bool,
        restart: bool,
        rollback: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let statuses = sd.list_by_names(&[unit]).await.map_err(|e| {
            ReconcileError::action(Attempt { verb: state::start_verb(start), rollback }, unit, e)
        })?;
        let Some(status) = statuses.first() else {
            return Err(ReconcileError::action(
                Attempt {
                    verb: state::start_verb(start),
                    rollback,
                },
                unit,
                missing_status(unit),
            ));
        };

        let active = state::is_active(&status.active_state);
        if state::is_failed(&status.active_state) {
            log::debug!("Unit {} is in failed state ({})", unit, status.sub_state);
        }

        let kind = if restart && start {
            JobKind::Restart
        } else if !active && start {
            JobKind::Start
        } else if active && !start {
            JobKind::Stop
        } else {
            log::trace!(
                "Activate {} {} (restart: {}): nothing to do (active={})",
                start,
                unit,
                restart,
                status.active_state
            );
            return Ok(());
        };

        let attempt = Attempt {
            verb: kind.verb(),
            rollback,
        };
        let mode = self.config.job_mode;
        log::trace!("Activate {} {} (restart: {}): {} {}", start, unit, restart, attempt, unit);

        let queued = match kind {
            JobKind::Start => sd.start(unit, mode).await,
            JobKind::Stop => sd.stop(unit, mode).await,
            JobKind::Restart => sd.restart(unit, mode).await,
        };
        let job = queued.map_err(|e| ReconcileError::action(attempt, unit, e))?;

        self.wait_job(job, attempt, unit, cancel).await
    }

    /// Wait for a job's result, giving up as soon as `cancel` fires
    async fn wait_job(
        &self,
        job: Job,
        attempt: Attempt,
        unit: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let path = job.path().to_string();
        log::trace!("Waiting for job {} ({} {})", path, attempt, unit);

        let timeout = self.config.job_timeout;
        let job_path = path.clone();
        let completion = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, job.wait()).await {
                    Ok(result) => result.map_err(ActionFailure::from),
                    Err(_) => Err(ActionFailure::Timeout {
                        job: job_path,
                        timeout: limit,
                    }),
                },
                None => job.wait().await.map_err(ActionFailure::from),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Cancelled while waiting for job {} ({} {})", path, attempt, unit);
                return Err(ReconcileError::Cancelled {
                    attempt,
                    unit: unit.to_string(),
                });
            }
            outcome = completion => outcome,
        };

        let result = outcome.map_err(|reason| ReconcileError::action(attempt, unit, reason))?;
        if result != state::JOB_DONE {
            return Err(ReconcileError::action(
                attempt,
                unit,
                ActionFailure::Job { job: path, result },
            ));
        }

        log::trace!("Job {} done ({} {})", path, attempt, unit);
        Ok(())
    }
}

fn log_changes(unit: &str, changes: &[UnitFileChange]) {
    for change in changes {
        log::debug!(
            "{}: {} {} -> {}",
            unit,
            change.kind,
            change.file,
            change.destination
        );
    }
}
