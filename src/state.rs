//! Unit state classification
//!
//! The manager reports load, active and unit-file states as free-form strings.
//! The reconciler only cares about three booleans:
//!
//! ```text
//!   ActiveState    ──► is_active   (active, reloading)
//!   UnitFileState  ──► is_enabled  (enabled, enabled-runtime, static, ...)
//!   UnitFileState  ──► is_masked   (masked, masked-runtime)
//! ```
//!
//! States sampled mid-transition (`activating`, `deactivating`) are not active:
//! callers re-read after the job completes.

// Unit file states
pub const ENABLED: &str = "enabled";
pub const ENABLED_RUNTIME: &str = "enabled-runtime";
pub const LINKED: &str = "linked";
pub const LINKED_RUNTIME: &str = "linked-runtime";
pub const MASKED: &str = "masked";
pub const MASKED_RUNTIME: &str = "masked-runtime";
pub const STATIC: &str = "static";
pub const DISABLED: &str = "disabled";
pub const INVALID: &str = "invalid";
pub const ALIAS: &str = "alias";
pub const INDIRECT: &str = "indirect";
pub const GENERATED: &str = "generated";
pub const TRANSIENT: &str = "transient";
pub const BAD: &str = "bad";

// Load states
pub const LOADED: &str = "loaded";
pub const ERROR: &str = "error";
pub const NOT_FOUND: &str = "not-found";

// Active states
pub const ACTIVE: &str = "active";
pub const RELOADING: &str = "reloading";
pub const INACTIVE: &str = "inactive";
pub const FAILED: &str = "failed";
pub const ACTIVATING: &str = "activating";
pub const DEACTIVATING: &str = "deactivating";

/// Terminal job result reported by JobRemoved on success
pub const JOB_DONE: &str = "done";

/// Enablement derived from a unit-file state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enablement {
    /// Unit counts as enabled (literally, or through static/alias/... linkage)
    pub enabled: bool,
    /// Enable/disable calls are meaningful for this state
    pub enableable: bool,
}

/// `active` and `reloading` satisfy the active contract, nothing else does
pub fn is_active(active_state: &str) -> bool {
    matches!(active_state, ACTIVE | RELOADING)
}

pub fn is_failed(active_state: &str) -> bool {
    active_state == FAILED
}

pub fn is_masked(unit_file_state: &str) -> bool {
    matches!(unit_file_state, MASKED | MASKED_RUNTIME)
}

/// Classify a unit-file state.
///
/// `static`, `enabled-runtime`, `alias`, `indirect` and `generated` count as
/// enabled without being literally `enabled`. Masked, invalid, transient and
/// unknown states are not enableable: enable/disable against them is skipped.
pub fn is_enabled(unit_file_state: &str) -> Enablement {
    match unit_file_state {
        ENABLED | ENABLED_RUNTIME | STATIC | ALIAS | INDIRECT | GENERATED => Enablement {
            enabled: true,
            enableable: true,
        },
        DISABLED | LINKED | LINKED_RUNTIME => Enablement {
            enabled: false,
            enableable: true,
        },
        _ => Enablement {
            enabled: false,
            enableable: false,
        },
    }
}

pub fn enable_verb(want: bool) -> &'static str {
    if want {
        "enable"
    } else {
        "disable"
    }
}

pub fn mask_verb(want: bool) -> &'static str {
    if want {
        "mask"
    } else {
        "unmask"
    }
}

pub fn start_verb(want: bool) -> &'static str {
    if want {
        "start"
    } else {
        "stop"
    }
}
