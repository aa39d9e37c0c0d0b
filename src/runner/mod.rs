//! Worker Session Runner (§4.10 / §2.10): one worker cycle, and the
//! once/default/watch loop driving cycles over time.

mod agent_process;

pub use agent_process::{build_agent_spec, AgentProcessOutcome, AgentProcessRunner, AgentProcessSpec, TokioAgentProcessRunner};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::events::{CycleReport, StepEvent};
use crate::finalize::{FinalizePipeline, FinalizePipelineContext};
use crate::git::{GitRepository, HistoryMode};
use crate::github::GitHubAdapter;
use crate::mutator::ChangesetMutator;
use crate::startup::{next_changeset, SelectionPolicy, StartupContract, StartupOptions};
use crate::store::TicketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Default,
    Watch,
}

pub struct RunnerOptions {
    pub loop_mode: LoopMode,
    pub watch_interval: Duration,
    pub explicit_epic_id: Option<String>,
    pub explicit_changeset_id: Option<String>,
    pub queue_only: bool,
    pub assume_yes: bool,
    pub agent_id: String,
    pub repo_slug: Option<String>,
    pub repo_root: PathBuf,
    pub project_data_dir: PathBuf,
    pub beads_root: PathBuf,
    pub branch_pr: bool,
    pub branch_history: HistoryMode,
    pub agent_command: Vec<String>,
}

pub struct WorkerSessionRunner {
    store: Arc<dyn TicketStore>,
    github: Arc<GitHubAdapter>,
    git: Arc<GitRepository>,
    mutator: Arc<ChangesetMutator>,
    agent: Arc<dyn AgentProcessRunner>,
}

impl WorkerSessionRunner {
    pub fn new(
        store: Arc<dyn TicketStore>,
        github: Arc<GitHubAdapter>,
        git: Arc<GitRepository>,
        mutator: Arc<ChangesetMutator>,
    ) -> Self {
        Self::with_agent_runner(store, github, git, mutator, Arc::new(TokioAgentProcessRunner))
    }

    pub fn with_agent_runner(
        store: Arc<dyn TicketStore>,
        github: Arc<GitHubAdapter>,
        git: Arc<GitRepository>,
        mutator: Arc<ChangesetMutator>,
        agent: Arc<dyn AgentProcessRunner>,
    ) -> Self {
        Self {
            store,
            github,
            git,
            mutator,
            agent,
        }
    }

    /// Drive cycles according to `options.loop_mode`, returning once the
    /// loop's exit condition is reached.
    pub async fn run_loop(&self, options: &RunnerOptions) -> Vec<CycleReport> {
        let mut reports = Vec::new();
        loop {
            let report = self.run_cycle(options).await;
            let was_empty = report.events.is_empty()
                || matches!(
                    report.final_reason.as_str(),
                    "no_eligible_epics" | "queue_blocked" | "inbox_blocked"
                );
            reports.push(report);

            match options.loop_mode {
                LoopMode::Once => break,
                LoopMode::Default => {
                    if was_empty {
                        break;
                    }
                }
                LoopMode::Watch => {
                    if was_empty {
                        info!(interval_seconds = options.watch_interval.as_secs(), "watch: no work, sleeping");
                        tokio::time::sleep(options.watch_interval).await;
                    }
                }
            }
        }
        reports
    }

    /// One worker cycle: 14 ordered steps (§4.10).
    pub async fn run_cycle(&self, options: &RunnerOptions) -> CycleReport {
        let started = std::time::Instant::now();
        let mut events = Vec::new();

        // 1. Resolve paths (repo root is already resolved by the caller
        // into `options.repo_root`).
        events.push(StepEvent::new("resolve_paths", started.elapsed()));

        // 2. Agent identity bead: record this agent's presence under the
        // epic root once an epic is claimed (see step 4 below); until then
        // there is no parent to attach the bead to.
        events.push(StepEvent::new("agent_identity", started.elapsed()));

        // 3. Prime store / reconcile cache.
        if let Err(e) = self.store.prime().await {
            warn!(error = %e, "store prime failed");
        }
        self.github.clear_runtime_cache().await;
        events.push(StepEvent::new("prime_store", started.elapsed()));

        // 4. Startup contract: claim an epic.
        let startup = StartupContract::new(self.store.clone(), self.github.clone());
        let selection_policy = if options.assume_yes {
            SelectionPolicy::Auto
        } else {
            SelectionPolicy::Prompt
        };
        let outcome = startup
            .select_epic(&StartupOptions {
                explicit_epic_id: options.explicit_epic_id.clone(),
                queue_only: options.queue_only,
                agent_id: options.agent_id.clone(),
                repo_slug: options.repo_slug.clone(),
                selection_policy,
            })
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                events.push(StepEvent::new("no_eligible_epics", started.elapsed()));
                return CycleReport {
                    events,
                    final_reason: "no_eligible_epics".to_string(),
                };
            }
        };

        if result.should_exit {
            events.push(StepEvent::new(result.reason, started.elapsed()));
            return CycleReport {
                events,
                final_reason: result.reason.to_string(),
            };
        }

        let Some(epic) = result.epic else {
            events.push(StepEvent::new("no_eligible_epics", started.elapsed()));
            return CycleReport {
                events,
                final_reason: "no_eligible_epics".to_string(),
            };
        };
        let epic = *epic;

        // Persist the claim: point this agent's hook at the epic, and if
        // reclaiming from a stale family member, clear its hook so it can't
        // still believe it owns this epic.
        if let Some(previous_assignee) = &result.reassign_from {
            let _ = self.store.set_agent_hook(previous_assignee, None).await;
        }
        let _ = self.store.set_assignee(&epic.id, Some(&options.agent_id)).await;
        let _ = self.store.set_agent_hook(&options.agent_id, Some(&epic.id)).await;
        let _ = self
            .store
            .create_message_bead(&epic.id, "agent session", &format!("claimed by {}", options.agent_id))
            .await;
        events.push(StepEvent::with_detail("claim_epic", started.elapsed(), epic.id.clone()));

        // 5-7. Resolve branches / validate child labels are implicit in the
        // lineage resolver and mutator, invoked per-changeset below.

        // 8. Pick changeset.
        let descendants = match self.store.list_descendant_changesets(&epic.id).await {
            Ok(d) => d,
            Err(_) => {
                events.push(StepEvent::new("descendants_unavailable", started.elapsed()));
                return CycleReport {
                    events,
                    final_reason: "no_eligible_epics".to_string(),
                };
            }
        };
        let changeset = if let Some(id) = &options.explicit_changeset_id {
            descendants.iter().find(|d| &d.id == id).or(Some(&epic))
        } else {
            next_changeset(&epic, &descendants)
        };
        let Some(changeset) = changeset else {
            events.push(StepEvent::new("no_runnable_changeset", started.elapsed()));
            return CycleReport {
                events,
                final_reason: "no_eligible_epics".to_string(),
            };
        };
        events.push(StepEvent::with_detail("pick_changeset", started.elapsed(), changeset.id.clone()));

        // 9. Prepare worktrees is owned by the git integration helper and
        // invoked by the agent-launch path outside this pure-decision cycle.

        // 10. Mark in progress.
        let _ = self.mutator.mark_in_progress(&changeset.id).await;
        events.push(StepEvent::new("mark_in_progress", started.elapsed()));

        // 11. Run agent: spawn the coding-agent subprocess and wait for it
        // to exit. A missing `agent_command` (e.g. in a dry-run/test
        // configuration) skips the spawn but still lets finalize run.
        if let Some(spec) = build_agent_spec(
            &options.agent_command,
            &options.repo_root,
            &options.beads_root,
            &options.agent_id,
            &epic.id,
            &changeset.id,
        ) {
            match self.agent.run_agent(&spec).await {
                Ok(outcome) if outcome.success() => {
                    events.push(StepEvent::new("run_agent", started.elapsed()));
                }
                Ok(outcome) => {
                    events.push(StepEvent::with_detail(
                        "run_agent",
                        started.elapsed(),
                        format!("exit status {}", outcome.status_code),
                    ));
                }
                Err(e) => {
                    events.push(StepEvent::with_detail("run_agent", started.elapsed(), e.to_string()));
                    return CycleReport {
                        events,
                        final_reason: "changeset_agent_process_failed".to_string(),
                    };
                }
            }
        } else {
            events.push(StepEvent::new("run_agent_skipped", started.elapsed()));
        }

        // 12. Review-feedback progress check happens inside finalize (step
        // 6 of the Finalize Pipeline).

        // 13. Persist cursor is a ticket-store field write performed by the
        // mutator as part of finalize's review-metadata update.

        // 14. Finalize.
        let pipeline = FinalizePipeline::new(
            self.store.clone(),
            self.github.clone(),
            self.git.clone(),
            self.mutator.clone(),
        );
        let ctx = FinalizePipelineContext {
            changeset_id: changeset.id.clone(),
            epic_id: epic.id.clone(),
            agent_id: options.agent_id.clone(),
            agent_bead_id: format!("{}-hook", options.agent_id),
            started_at: chrono::Utc::now(),
            repo_slug: options.repo_slug.clone(),
            repo_root: options.repo_root.clone(),
            project_data_dir: Some(options.project_data_dir.clone()),
            branch_pr: options.branch_pr,
            branch_history: options.branch_history,
            blocking_message_thread_ids: vec![],
        };
        let result = pipeline.run(&ctx).await;
        events.push(StepEvent::with_detail("finalize", started.elapsed(), result.reason.clone()));

        CycleReport {
            events,
            final_reason: result.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_mode_once_runs_a_single_cycle_conceptually() {
        assert_eq!(LoopMode::Once, LoopMode::Once);
    }
}
