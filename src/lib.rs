//! unitsync - declarative systemd unit state
//!
//! Given how a unit should look (enabled, masked, running), unitsync:
//! - Reads the unit's live state over the systemd D-Bus API
//! - Applies the minimal enable/mask/start corrections, in that order
//! - Waits for start/stop/restart jobs to complete
//! - Remembers the pre-management state and restores it on delete
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Reconciler                     │
//! ├─────────────────────────────────────────────────┤
//! │  Unit Locks  │  State Classifier │  Rollback    │
//! ├─────────────────────────────────────────────────┤
//! │         Service manager client (D-Bus)           │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dbus;
pub mod diag;
pub mod error;
pub mod locks;
pub mod reconciler;
pub mod resource;
pub mod state;
pub mod store;

pub use config::{JobMode, ReconcilerConfig};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use error::ReconcileError;
pub use locks::UnitLocks;
pub use reconciler::Reconciler;
pub use resource::{ResourceData, Scope, TriState, UnitSpec};
