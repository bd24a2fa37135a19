//! Refresh a unit's recorded state

use unitsync::resource::{ResourceData, UnitSpec};

use super::{report, show::print_data, Context};

pub async fn read(ctx: &Context, name: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut data = match ctx.store.load(ctx.scope, name)? {
        Some(record) => {
            let declared = record
                .applied
                .clone()
                .unwrap_or_else(|| UnitSpec::new(name).scope(ctx.scope));
            record.into_data(declared)
        }
        None => ResourceData::new(UnitSpec::new(name).scope(ctx.scope)),
    };

    let diags = ctx.reconciler.read(&mut data, &ctx.cancel).await;
    ctx.save(&data)?;
    let ok = report(&diags);

    if ok {
        print_data(&data);
    }

    Ok(ok)
}
