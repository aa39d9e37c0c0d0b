use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(about = "Multi-agent development-supervisor runtime")]
#[command(long_about = "atelier drives coding agents through an epic -> changeset -> pull-request \
                       lifecycle, backed by a ticket store and git. Run 'atelier run' to start a \
                       worker cycle, or 'atelier reconcile' to repair drift without running an agent.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more worker cycles
    Run {
        /// Run exactly one cycle and exit
        #[arg(long, help = "Run a single worker cycle and exit")]
        once: bool,
        /// Keep running, sleeping between empty cycles
        #[arg(long, help = "Run continuously, sleeping when there is no work")]
        watch: bool,
        /// Claim a specific epic instead of running selection
        #[arg(long, help = "Epic id to claim directly")]
        epic: Option<String>,
        /// Run a specific changeset within the claimed epic
        #[arg(long, help = "Changeset id to run directly")]
        changeset: Option<String>,
        /// Exit after queue-only checks without claiming work
        #[arg(long, help = "Exit before claiming any epic")]
        queue_only: bool,
        /// Auto-approve epic selection without prompting
        #[arg(short = 'y', long, help = "Skip interactive selection prompts")]
        assume_yes: bool,
    },
    /// Reconcile drift between the ticket store and live GitHub/git state
    Reconcile {
        /// Restrict reconciliation to one epic
        #[arg(long, help = "Epic id to reconcile")]
        epic: Option<String>,
        /// Restrict reconciliation to one changeset
        #[arg(long, help = "Changeset id to reconcile")]
        changeset: Option<String>,
        /// Report what would change without mutating the ticket store
        #[arg(long, help = "Preview reconcile actions without applying them")]
        dry_run: bool,
    },
}
