//! On-disk resource records
//!
//! Layout:
//!
//! ```text
//! <state dir>/
//! ├── system/
//! │   └── nginx_2eservice.state      # rmp-encoded Record
//! └── user/
//!     └── syncthing_2eservice.state
//! ```

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dbus::escape_unit_name;
use crate::resource::{ResourceData, Scope, UnitSpec, UnitState};

const FALLBACK_STATE_DIR: &str = "/var/lib/unitsync";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: rmp_serde::decode::Error,
    },

    #[error("cannot encode record for {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: rmp_serde::encode::Error,
    },
}

/// Everything persisted for one unit between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Declaration last converged, None until the first successful apply
    pub applied: Option<UnitSpec>,
    pub state: UnitState,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn from_data(data: &ResourceData) -> Self {
        Self {
            applied: data.applied().cloned(),
            state: data.state().clone(),
            updated_at: Utc::now(),
        }
    }

    /// Resume a resource with a new declaration
    pub fn into_data(self, declared: UnitSpec) -> ResourceData {
        ResourceData::from_parts(declared, self.applied, self.state)
    }
}

pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_STATE_HOME/unitsync`, or /var/lib/unitsync when there is no home
    pub fn default_root() -> PathBuf {
        dirs::state_dir()
            .map(|dir| dir.join("unitsync"))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STATE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, scope: Scope, name: &str) -> PathBuf {
        self.root
            .join(scope.as_str())
            .join(format!("{}.state", escape_unit_name(name)))
    }

    pub fn load(&self, scope: Scope, name: &str) -> Result<Option<Record>, StoreError> {
        let path = self.path(scope, name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        rmp_serde::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Decode { path, source })
    }

    pub fn save(&self, scope: Scope, name: &str, record: &Record) -> Result<(), StoreError> {
        let path = self.path(scope, name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes = rmp_serde::to_vec_named(record).map_err(|source| StoreError::Encode {
            name: name.to_string(),
            source,
        })?;

        // Write then rename so a crash never leaves a truncated record
        let tmp = path.with_extension("state.tmp");
        std::fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })?;

        log::debug!("Saved record for {} ({})", name, scope);
        Ok(())
    }

    /// Remove a record; missing records are not an error
    pub fn remove(&self, scope: Scope, name: &str) -> Result<(), StoreError> {
        let path = self.path(scope, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
