//! Roll a unit back and forget it

use super::{report, Context};

pub async fn delete(ctx: &Context, name: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(record) = ctx.store.load(ctx.scope, name)? else {
        println!("{} is not managed", name);
        return Ok(true);
    };

    // Delete acts on the last converged declaration, as recorded
    let declared = record
        .applied
        .clone()
        .unwrap_or_else(|| unitsync::UnitSpec::new(name).scope(ctx.scope));
    let mut data = record.into_data(declared);

    let diags = ctx.reconciler.delete(&mut data, &ctx.cancel).await;
    let ok = report(&diags);

    if ok {
        ctx.store.remove(ctx.scope, name)?;
        log::debug!("Removed record for {} ({})", name, ctx.scope);
        println!("{} rolled back", name);
    } else {
        ctx.save(&data)?;
    }

    Ok(ok)
}
