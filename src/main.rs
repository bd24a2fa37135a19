mod commands;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use commands::Context;
use unitsync::dbus::DbusConnector;
use unitsync::store::StateStore;
use unitsync::{JobMode, Reconciler, ReconcilerConfig, Scope, TriState, UnitLocks, UnitSpec};

#[derive(Parser)]
#[command(name = "unitsync")]
#[command(about = "Declarative systemd unit state")]
struct Args {
    /// Manage a unit of the user service manager
    #[arg(long, global = true, conflicts_with = "system")]
    user: bool,

    /// Manage a unit of the system service manager (default)
    #[arg(long, global = true)]
    system: bool,

    /// Directory holding per-unit records
    #[arg(long, global = true, env = "UNITSYNC_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Job mode for start/stop/restart
    #[arg(long, global = true, default_value = "replace")]
    job_mode: JobMode,

    /// Give up on a single job after this many seconds
    #[arg(long, global = true)]
    job_timeout: Option<u64>,

    /// Cancel the whole operation after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Converge a unit to the given state (create or update)
    Apply {
        /// Unit name (e.g., "nginx.service")
        name: String,

        #[command(flatten)]
        knobs: Knobs,
    },

    /// Refresh a managed unit's recorded state
    Read {
        /// Unit name
        name: String,
    },

    /// Roll a unit back to its pre-management state and forget it
    Delete {
        /// Unit name
        name: String,
    },

    /// Show the recorded state of a unit without contacting systemd
    Show {
        /// Unit name
        name: String,
    },
}

#[derive(ClapArgs)]
struct Knobs {
    /// Whether the unit starts at boot (omit to restore the pre-management state)
    #[arg(long, value_name = "BOOL")]
    enable: Option<bool>,

    /// Whether the unit is masked (omit to restore the pre-management state)
    #[arg(long, value_name = "BOOL")]
    mask: Option<bool>,

    /// Whether the unit is running (omit to restore the pre-management state)
    #[arg(long, value_name = "BOOL")]
    start: Option<bool>,

    /// Restart the unit whenever this set of KEY=VALUE pairs changes
    #[arg(long = "restart-on", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    restart_on: Vec<(String, String)>,

    /// Report action failures as warnings
    #[arg(long)]
    ignore_errors: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl Knobs {
    fn into_spec(self, name: String, scope: Scope) -> UnitSpec {
        UnitSpec {
            name,
            scope,
            enable: TriState::from(self.enable),
            mask: TriState::from(self.mask),
            start: TriState::from(self.start),
            restart_on: self.restart_on.into_iter().collect::<BTreeMap<_, _>>(),
            ignore_errors: self.ignore_errors,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let scope = if args.user && !args.system { Scope::User } else { Scope::System };

    let mut config = ReconcilerConfig::new().with_job_mode(args.job_mode);
    if let Some(secs) = args.job_timeout {
        config = config.with_job_timeout(Duration::from_secs(secs));
    }

    let cancel = CancellationToken::new();
    spawn_canceller(cancel.clone(), args.timeout.map(Duration::from_secs));

    let ctx = Context {
        reconciler: Reconciler::new(Arc::new(DbusConnector), Arc::new(UnitLocks::new()), config),
        store: StateStore::new(args.state_dir.unwrap_or_else(StateStore::default_root)),
        scope,
        cancel,
    };

    let ok = match args.command {
        Command::Apply { name, knobs } => {
            let spec = knobs.into_spec(name, scope);
            commands::apply(&ctx, spec).await?
        }
        Command::Read { name } => commands::read(&ctx, &name).await?,
        Command::Delete { name } => commands::delete(&ctx, &name).await?,
        Command::Show { name } => commands::show(&ctx, &name)?,
    };

    if !ok {
        std::process::exit(1);
    }

    Ok(())
}

/// Cancel on Ctrl-C, or once the overall deadline passes
fn spawn_canceller(cancel: CancellationToken, deadline: Option<Duration>) {
    tokio::spawn(async move {
        let expired = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::warn!("Interrupted, cancelling"),
            _ = expired => log::warn!("Deadline reached, cancelling"),
        }
        cancel.cancel();
    });
}
