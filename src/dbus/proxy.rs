//! org.freedesktop.systemd1.Manager client proxy
//!
//! Only the calls the reconciler issues, plus the JobRemoved signal used to
//! learn when a queued job finishes.

use zbus::{
    proxy,
    zvariant::{ObjectPath, OwnedObjectPath},
};

/// (name, description, load_state, active_state, sub_state, followed,
///  unit_path, job_id, job_type, job_path)
pub type UnitRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

/// (type, file, destination)
pub type ChangeRow = (String, String, String);

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
pub trait Systemd1Manager {
    /// Enable signal emission (JobRemoved is only sent to subscribers)
    fn subscribe(&self) -> zbus::Result<()>;

    /// daemon-reload
    fn reload(&self) -> zbus::Result<()>;

    fn list_units_by_names(&self, names: &[&str]) -> zbus::Result<Vec<UnitRow>>;

    fn get_unit_file_state(&self, file: &str) -> zbus::Result<String>;

    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<ChangeRow>)>;

    fn disable_unit_files(&self, files: &[&str], runtime: bool) -> zbus::Result<Vec<ChangeRow>>;

    fn mask_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<Vec<ChangeRow>>;

    fn unmask_unit_files(&self, files: &[&str], runtime: bool) -> zbus::Result<Vec<ChangeRow>>;

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    /// Emitted when a job completes
    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: ObjectPath<'_>, unit: &str, result: &str)
        -> zbus::Result<()>;
}
