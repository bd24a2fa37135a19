//! Unit resource attributes
//!
//! ```text
//!   UnitSpec   (declared)  name, scope, enable/mask/start, restart_on, ignore_errors
//!   UnitSpec   (applied)   the declaration last converged, for change detection
//!   UnitState  (computed)  id, reported knobs, observed state, rollback snapshot
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dbus::UnitStatus;
use crate::state;

/// A knob that may be left unset, distinct from an explicit false
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    pub fn value(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::True => Some(true),
            Self::False => Some(false),
        }
    }

    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        value.map(Self::from).unwrap_or(Self::Unset)
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
        }
    }
}

/// Which service manager owns the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    System,
    User,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared attributes of a unit resource
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unit name, immutable for the life of the resource
    pub name: String,
    pub scope: Scope,
    pub enable: TriState,
    pub mask: TriState,
    pub start: TriState,
    /// Any change to this map forces a restart
    pub restart_on: BTreeMap<String, String>,
    /// Downgrade action failures to warnings
    pub ignore_errors: bool,
}

impl UnitSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = enable.into();
        self
    }

    pub fn mask(mut self, mask: bool) -> Self {
        self.mask = mask.into();
        self
    }

    pub fn start(mut self, start: bool) -> Self {
        self.start = start.into();
        self
    }

    pub fn restart_on(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.restart_on.insert(key.into(), value.into());
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }
}

/// Attributes recomputed on every read
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Observed {
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub followed: String,
    pub job_id: u32,
    pub job_type: String,
    pub is_active: bool,
    pub is_enabled: bool,
    pub is_masked: bool,
}

impl Observed {
    pub fn from_status(status: &UnitStatus) -> Self {
        Self {
            description: status.description.clone(),
            load_state: status.load_state.clone(),
            active_state: status.active_state.clone(),
            sub_state: status.sub_state.clone(),
            followed: status.followed.clone(),
            job_id: status.job_id,
            job_type: status.job_type.clone(),
            is_active: false,
            is_enabled: false,
            is_masked: false,
        }
    }
}

/// State of the unit the first time it came under management.
///
/// Captured once and never overwritten; it is what an unset knob or a
/// deleted resource converges back to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub existed: bool,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub unit_file_state: String,
    pub active: bool,
    pub enabled: bool,
}

impl RollbackSnapshot {
    /// Snapshot of a unit the manager does not know about
    pub fn absent(status: &UnitStatus) -> Self {
        Self {
            existed: false,
            load_state: status.load_state.clone(),
            active_state: status.active_state.clone(),
            sub_state: status.sub_state.clone(),
            ..Self::default()
        }
    }

    pub fn capture(status: &UnitStatus, unit_file_state: &str) -> Self {
        Self {
            existed: true,
            load_state: status.load_state.clone(),
            active_state: status.active_state.clone(),
            sub_state: status.sub_state.clone(),
            unit_file_state: unit_file_state.to_string(),
            active: state::is_active(&status.active_state),
            enabled: state::is_enabled(unit_file_state).enabled,
        }
    }

    pub fn masked(&self) -> bool {
        state::is_masked(&self.unit_file_state)
    }

    /// Unit-file state to restore: the captured mask flavour, or "" for unmasked
    pub fn mask_target(&self) -> &str {
        if self.masked() {
            &self.unit_file_state
        } else {
            ""
        }
    }

    /// Opaque string map exposed as the `rollback` attribute
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("existed".to_string(), self.existed.to_string()),
            ("load_state".to_string(), self.load_state.clone()),
            ("active_state".to_string(), self.active_state.clone()),
            ("sub_state".to_string(), self.sub_state.clone()),
            ("unit_file_state".to_string(), self.unit_file_state.clone()),
            ("active".to_string(), self.active.to_string()),
            ("enabled".to_string(), self.enabled.to_string()),
            ("masked".to_string(), self.masked().to_string()),
        ])
    }
}

/// Computed attributes persisted between lifecycle calls
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitState {
    /// Canonical unit name reported by the manager; empty when not found
    pub id: String,
    /// Knob values as last observed. `enable` is only refreshed while the
    /// unit-file state is enableable. All three are None when not found.
    pub enable: Option<bool>,
    pub mask: Option<bool>,
    pub start: Option<bool>,
    pub observed: Observed,
    pub rollback: Option<RollbackSnapshot>,
}

/// Attributes that participate in change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Enable,
    Mask,
    Start,
    RestartOn,
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("cannot change name of {current} to {requested}: name is immutable")]
    NameChanged { current: String, requested: String },

    #[error("cannot move {name} from {current} to {requested} scope")]
    ScopeChanged {
        name: String,
        current: Scope,
        requested: Scope,
    },
}

/// Attribute bag for one unit resource
#[derive(Debug, Clone)]
pub struct ResourceData {
    declared: UnitSpec,
    applied: Option<UnitSpec>,
    state: UnitState,
}

impl ResourceData {
    /// A resource that has never been applied
    pub fn new(declared: UnitSpec) -> Self {
        Self {
            declared,
            applied: None,
            state: UnitState::default(),
        }
    }

    /// Rebuild from persisted attributes
    pub fn from_parts(declared: UnitSpec, applied: Option<UnitSpec>, state: UnitState) -> Self {
        Self {
            declared,
            applied,
            state,
        }
    }

    pub fn into_parts(self) -> (UnitSpec, Option<UnitSpec>, UnitState) {
        (self.declared, self.applied, self.state)
    }

    pub fn name(&self) -> &str {
        &self.declared.name
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn declared(&self) -> &UnitSpec {
        &self.declared
    }

    pub fn applied(&self) -> Option<&UnitSpec> {
        self.applied.as_ref()
    }

    pub fn state(&self) -> &UnitState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut UnitState {
        &mut self.state
    }

    /// Replace the declaration, keeping name and scope fixed
    pub fn redeclare(&mut self, spec: UnitSpec) -> Result<(), ResourceError> {
        if spec.name != self.declared.name {
            return Err(ResourceError::NameChanged {
                current: self.declared.name.clone(),
                requested: spec.name,
            });
        }
        if spec.scope != self.declared.scope {
            return Err(ResourceError::ScopeChanged {
                name: spec.name,
                current: self.declared.scope,
                requested: spec.scope,
            });
        }
        self.declared = spec;
        Ok(())
    }

    /// Whether a set knob differs from its last observed value, so drift
    /// since the last apply is picked up again. Unset knobs never count.
    /// `restart_on` is compared with the last applied declaration, and an
    /// empty one never counts before the first apply.
    pub fn has_change(&self, field: Field) -> bool {
        fn differs(declared: TriState, reported: Option<bool>) -> bool {
            declared.value().is_some_and(|want| reported != Some(want))
        }

        match field {
            Field::Enable => differs(self.declared.enable, self.state.enable),
            Field::Mask => differs(self.declared.mask, self.state.mask),
            Field::Start => differs(self.declared.start, self.state.start),
            Field::RestartOn => match &self.applied {
                Some(applied) => applied.restart_on != self.declared.restart_on,
                None => !self.declared.restart_on.is_empty(),
            },
        }
    }

    /// Record the declaration as converged
    pub fn commit(&mut self) {
        self.applied = Some(self.declared.clone());
    }

    /// Forget everything computed, after the resource has been deleted
    pub fn clear(&mut self) {
        self.applied = None;
        self.state = UnitState::default();
    }
}
