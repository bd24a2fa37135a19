//! Show a unit's recorded state

use unitsync::resource::{ResourceData, UnitSpec};

use super::Context;

pub fn show(ctx: &Context, name: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(record) = ctx.store.load(ctx.scope, name)? else {
        println!("{} is not managed", name);
        return Ok(true);
    };

    let updated_at = record.updated_at;
    let declared = record
        .applied
        .clone()
        .unwrap_or_else(|| UnitSpec::new(name).scope(ctx.scope));
    let data = record.into_data(declared);

    print_data(&data);
    println!("     Updated: {}", updated_at.to_rfc3339());

    Ok(true)
}

pub(super) fn print_data(data: &ResourceData) {
    let state = data.state();
    let observed = &state.observed;

    let symbol = if data.id().is_empty() {
        "○"
    } else if observed.is_active {
        "●"
    } else {
        "◐"
    };
    println!("{} {} - {}", symbol, data.name(), observed.description);
    println!("       Scope: {}", data.declared().scope);
    println!(
        "      Loaded: {} (enabled: {}, masked: {})",
        observed.load_state, observed.is_enabled, observed.is_masked
    );
    println!("      Active: {} ({})", observed.active_state, observed.sub_state);
    if !observed.followed.is_empty() {
        println!("    Followed: {}", observed.followed);
    }
    if observed.job_id != 0 {
        println!("         Job: {} ({})", observed.job_id, observed.job_type);
    }

    let declared = data.declared();
    println!(
        "    Declared: enable={} mask={} start={}",
        declared.enable, declared.mask, declared.start
    );
    println!(
        "    Reported: enable={} mask={} start={}",
        fmt_knob(state.enable),
        fmt_knob(state.mask),
        fmt_knob(state.start)
    );
    if !declared.restart_on.is_empty() {
        let pairs: Vec<String> = declared
            .restart_on
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!("  Restart on: {}", pairs.join(", "));
    }

    if let Some(rollback) = &state.rollback {
        println!("    Rollback:");
        for (key, value) in rollback.to_map() {
            println!("      {:<16} {}", key, value);
        }
    }
}

fn fmt_knob(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
