//! atelier: a multi-agent development-supervisor runtime that drives coding
//! agents through an epic -> changeset -> pull-request lifecycle, backed by
//! a ticket-store CLI and git, with GitHub PR integration via `gh`.

pub mod cli;
pub mod config;
pub mod events;
pub mod external;
pub mod finalize;
pub mod git;
pub mod github;
pub mod lineage;
pub mod mutator;
pub mod prgate;
pub mod reconcile;
pub mod runner;
pub mod shutdown;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod ticket;

pub use config::{config, init_config, AtelierConfig};
pub use events::{CycleReport, StepEvent};
pub use finalize::{FinalizePipeline, FinalizePipelineContext, FinalizeResult};
pub use git::{GitError, GitRepository, HistoryMode};
pub use github::{GitHubAdapter, GitHubError};
pub use mutator::{ChangesetMutator, MutatorError};
pub use reconcile::{ReconcileOptions, ReconcileReport, ReconcileService};
pub use runner::{LoopMode, RunnerOptions, WorkerSessionRunner};
pub use shutdown::ShutdownSignal;
pub use startup::{SelectionPolicy, StartupContract, StartupContractResult, StartupOptions};
pub use store::{BeadsTicketStore, TicketStore, TicketStoreError};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use ticket::{CanonicalStatus, Issue, IssueType, ReviewLifecycle};
