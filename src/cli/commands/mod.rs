use std::sync::Arc;

use crate::config::AtelierConfig;
use crate::external::command::ProcessCommandExecutor;
use crate::git::{GitRepository, HistoryMode};
use crate::github::GitHubAdapter;
use crate::mutator::ChangesetMutator;
use crate::store::{BeadsTicketStore, TicketStore};

pub mod reconcile;
pub mod run;

/// Construct the shared adapter set every command needs, wired to the real
/// `git`/`gh`/`bd` CLIs via [`ProcessCommandExecutor`].
pub struct Runtime {
    pub store: Arc<dyn TicketStore>,
    pub github: Arc<GitHubAdapter>,
    pub git: Arc<GitRepository>,
    pub mutator: Arc<ChangesetMutator>,
    pub config: AtelierConfig,
}

impl Runtime {
    pub fn new(config: AtelierConfig) -> Self {
        let executor = Arc::new(ProcessCommandExecutor);
        let store: Arc<dyn TicketStore> = Arc::new(BeadsTicketStore::with_binary(
            executor.clone(),
            config.paths.bd_path.clone(),
        ));
        let github = Arc::new(GitHubAdapter::new(executor.clone()));
        let git = Arc::new(GitRepository::with_binary(
            executor.clone(),
            config.paths.git_path.clone(),
        ));
        let mutator = Arc::new(ChangesetMutator::new(store.clone()));

        Self {
            store,
            github,
            git,
            mutator,
            config,
        }
    }

    pub fn branch_history(&self) -> HistoryMode {
        HistoryMode::parse(&self.config.worker.branch_history).unwrap_or(HistoryMode::Manual)
    }
}
