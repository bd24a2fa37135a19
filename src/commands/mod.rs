mod apply;
mod delete;
mod read;
mod show;

pub use apply::apply;
pub use delete::delete;
pub use read::read;
pub use show::show;

use tokio_util::sync::CancellationToken;
use unitsync::resource::{ResourceData, Scope};
use unitsync::store::{Record, StateStore};
use unitsync::{diag, Diagnostics, Reconciler};

/// Everything a command needs to drive one lifecycle call
pub struct Context {
    pub reconciler: Reconciler,
    pub store: StateStore,
    pub scope: Scope,
    pub cancel: CancellationToken,
}

impl Context {
    /// Persist the resource if it has a rollback snapshot worth keeping
    fn save(&self, data: &ResourceData) -> Result<(), Box<dyn std::error::Error>> {
        if data.state().rollback.is_some() {
            self.store
                .save(self.scope, data.name(), &Record::from_data(data))?;
        }
        Ok(())
    }
}

/// Print diagnostics; returns false if any of them is an error
fn report(diags: &Diagnostics) -> bool {
    for d in diags {
        eprintln!("{}", d);
    }
    !diag::has_errors(diags)
}
