use std::time::Duration;

use anyhow::Result;

use crate::runner::{LoopMode, RunnerOptions, WorkerSessionRunner};

use super::Runtime;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    runtime: Runtime,
    once: bool,
    watch: bool,
    epic: Option<String>,
    changeset: Option<String>,
    queue_only: bool,
    assume_yes: bool,
) -> Result<()> {
    let loop_mode = match (once, watch) {
        (true, _) => LoopMode::Once,
        (_, true) => LoopMode::Watch,
        _ => LoopMode::Default,
    };

    let runner = WorkerSessionRunner::new(
        runtime.store.clone(),
        runtime.github.clone(),
        runtime.git.clone(),
        runtime.mutator.clone(),
    );

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "worker".to_string());
    let agent_id = format!("atelier/worker/{host}/p{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let options = RunnerOptions {
        loop_mode,
        watch_interval: Duration::from_secs(runtime.config.worker.watch_interval_seconds),
        explicit_epic_id: epic,
        explicit_changeset_id: changeset,
        queue_only,
        assume_yes: assume_yes || runtime.config.worker.assume_yes,
        agent_id,
        repo_slug: runtime.config.repo.slug.clone(),
        repo_root: runtime.config.repo.root.clone(),
        project_data_dir: runtime.config.paths.project_data_dir.clone(),
        beads_root: runtime.config.paths.beads_root.clone(),
        branch_pr: runtime.config.worker.branch_pr,
        branch_history: runtime.branch_history(),
        agent_command: runtime.config.worker.agent_command.clone(),
    };

    let reports = runner.run_loop(&options).await;
    for report in &reports {
        let json = serde_json::to_string(report)?;
        println!("{json}");
    }
    Ok(())
}
