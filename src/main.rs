use anyhow::Result;
use clap::Parser;

use atelier::cli::commands::{reconcile, run, Runtime};
use atelier::cli::{Cli, Commands};
use atelier::config::{config, init_config};
use atelier::shutdown::ShutdownSignal;
use atelier::telemetry::{init_telemetry, shutdown_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = init_config() {
        eprintln!("Warning: failed to initialize configuration: {e}");
    }

    if let Err(e) = init_telemetry() {
        eprintln!("Warning: failed to initialize telemetry: {e}");
    }

    let cli = Cli::parse();
    let cfg = config()?.clone();
    let runtime = Runtime::new(cfg);

    let result = match cli.command {
        Commands::Run {
            once,
            watch,
            epic,
            changeset,
            queue_only,
            assume_yes,
        } => {
            let work = run::execute(runtime, once, watch, epic, changeset, queue_only, assume_yes);
            if watch && !once {
                tokio::select! {
                    result = work => result,
                    _ = ShutdownSignal::wait() => Ok(()),
                }
            } else {
                work.await
            }
        }
        Commands::Reconcile {
            epic,
            changeset,
            dry_run,
        } => reconcile::execute(runtime, epic, changeset, dry_run).await,
    };

    shutdown_telemetry();
    result
}
