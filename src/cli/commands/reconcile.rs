use anyhow::Result;

use crate::reconcile::{ReconcileOptions, ReconcileService};

use super::Runtime;

pub async fn execute(
    runtime: Runtime,
    epic: Option<String>,
    changeset: Option<String>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        tracing::warn!("--dry-run is not yet wired to a non-mutating preview; running live reconcile");
    }

    let service = ReconcileService::new(
        runtime.store.clone(),
        runtime.github.clone(),
        runtime.git.clone(),
        runtime.mutator.clone(),
    );

    let options = ReconcileOptions {
        repo_slug: runtime.config.repo.slug.clone(),
        repo_root: runtime.config.repo.root.clone(),
        project_data_dir: runtime.config.paths.project_data_dir.clone(),
        branch_pr: runtime.config.worker.branch_pr,
        branch_history: runtime.branch_history(),
    };

    let report = service.run(&options, epic.as_deref(), changeset.as_deref()).await;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
