//! Converge a unit (create or update)

use unitsync::diag;
use unitsync::resource::{ResourceData, UnitSpec};
use unitsync::store::Record;

use super::{report, Context};

pub async fn apply(ctx: &Context, spec: UnitSpec) -> Result<bool, Box<dyn std::error::Error>> {
    let name = spec.name.clone();

    let (data, diags) = match ctx.store.load(ctx.scope, &name)? {
        Some(Record {
            applied: Some(applied),
            state,
            ..
        }) => {
            log::debug!("Updating {} from its stored record", name);
            let mut data = ResourceData::from_parts(applied.clone(), Some(applied), state);
            data.redeclare(spec)?;
            // Refresh first so drift since the last apply shows up as a change
            let diags = ctx.reconciler.read(&mut data, &ctx.cancel).await;
            if diag::has_errors(&diags) {
                (data, diags)
            } else {
                let diags = ctx.reconciler.update(&mut data, &ctx.cancel).await;
                (data, diags)
            }
        }
        record => {
            // Never converged: create, keeping any snapshot from an earlier attempt
            let mut data = match record {
                Some(record) => record.into_data(spec),
                None => ResourceData::new(spec),
            };
            let diags = ctx.reconciler.create(&mut data, &ctx.cancel).await;
            (data, diags)
        }
    };

    ctx.save(&data)?;
    let ok = report(&diags);

    if ok {
        let observed = &data.state().observed;
        if data.id().is_empty() {
            println!("○ {} - not found", name);
        } else {
            println!(
                "● {} - {} ({})",
                data.id(),
                observed.active_state,
                observed.sub_state
            );
        }
    }

    Ok(ok)
}
