//! Finalize Pipeline (§4.7 / §2.7): the ordered decision tree run once per
//! worker cycle after the agent process exits.

mod align_base;
mod epic_rollup;
mod premature_merged;
mod pushed_without_pr;

pub use align_base::align_existing_pr_base;
pub use epic_rollup::run_epic_rollup;
pub use premature_merged::recover_premature_merged_changeset;
pub use pushed_without_pr::handle_pushed_without_pr;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::git::{GitRepository, HistoryMode};
use crate::github::{GitHubAdapter, PrLookupOutcome};
use crate::mutator::{ChangesetMutator, ReviewMetadata};
use crate::prgate::{normalize_pr_strategy, pr_strategy_decision, PrAction};
use crate::store::TicketStore;
use crate::ticket::Issue;

/// Everything the pipeline needs for one changeset's finalize decision.
#[derive(Debug, Clone)]
pub struct FinalizePipelineContext {
    pub changeset_id: String,
    pub epic_id: String,
    pub agent_id: String,
    pub agent_bead_id: String,
    pub started_at: DateTime<Utc>,
    pub repo_slug: Option<String>,
    pub repo_root: PathBuf,
    pub project_data_dir: Option<PathBuf>,
    pub branch_pr: bool,
    pub branch_history: HistoryMode,
    pub blocking_message_thread_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeResult {
    pub continue_running: bool,
    pub reason: String,
}

impl FinalizeResult {
    fn stop(reason: &str) -> Self {
        Self {
            continue_running: false,
            reason: reason.to_string(),
        }
    }

    fn keep_going(reason: &str) -> Self {
        Self {
            continue_running: true,
            reason: reason.to_string(),
        }
    }
}

pub struct FinalizePipeline {
    pub store: Arc<dyn TicketStore>,
    pub github: Arc<GitHubAdapter>,
    pub git: Arc<GitRepository>,
    pub mutator: Arc<ChangesetMutator>,
}

impl FinalizePipeline {
    pub fn new(
        store: Arc<dyn TicketStore>,
        github: Arc<GitHubAdapter>,
        git: Arc<GitRepository>,
        mutator: Arc<ChangesetMutator>,
    ) -> Self {
        Self {
            store,
            github,
            git,
            mutator,
        }
    }

    /// Run the 13-step ordered decision tree for one changeset.
    pub async fn run(&self, ctx: &FinalizePipelineContext) -> FinalizeResult {
        // 1. Load changeset.
        let issue = match self.store.show(&ctx.changeset_id).await {
            Ok(issue) => issue,
            Err(_) => return FinalizeResult::stop("changeset_not_found"),
        };

        // 2. Invalid changeset labels.
        if issue.has_label("at:subtask") {
            return FinalizeResult::stop("changeset_label_violation");
        }

        // 3. Terminal label present.
        if issue.has_label("cs:merged") || issue.has_label("cs:abandoned") {
            return self.handle_terminal_label(ctx, &issue).await;
        }

        // 4. Sequential stack integrity preflight.
        if let Some(result) = self.stack_integrity_preflight(ctx, &issue).await {
            return result;
        }

        // 5. Blocking planner messages.
        if !ctx.blocking_message_thread_ids.is_empty() {
            let _ = self
                .mutator
                .mark_blocked(&ctx.changeset_id, "message requires planner decision")
                .await;
            return FinalizeResult::stop("changeset_blocked_message");
        }

        // 6. In-progress but waiting on review.
        if issue.canonical_status() == Some(crate::ticket::CanonicalStatus::InProgress)
            && issue.has_label("at:unread")
        {
            return FinalizeResult::keep_going("changeset_review_pending");
        }

        // 7. Missing changeset.work_branch.
        let work_branch = crate::lineage::work_branch(&issue);
        let Some(work_branch) = work_branch else {
            let _ = self
                .mutator
                .mark_blocked(&ctx.changeset_id, "missing changeset.work_branch metadata")
                .await;
            return FinalizeResult::stop("changeset_blocked_missing_metadata");
        };

        // 8. Live lifecycle evaluation via GitHub Adapter.
        let Some(repo_slug) = ctx.repo_slug.as_deref() else {
            return FinalizeResult::stop("changeset_pr_missing_repo_slug");
        };
        let outcome = self.github.lookup_github_pr_status(repo_slug, &work_branch).await;
        let (payload, lookup_failed) = match &outcome {
            PrLookupOutcome::Found(payload) => (Some(payload.as_ref()), false),
            PrLookupOutcome::NotFound => (None, false),
            PrLookupOutcome::Error(_) => (None, true),
        };
        if lookup_failed {
            return FinalizeResult::stop("changeset_pr_status_query_failed");
        }

        let pushed = self
            .git
            .has_remote_branch(&ctx.repo_root, &work_branch)
            .await
            .unwrap_or(false);
        let review_requested = payload.map(GitHubAdapter::has_review_requests).unwrap_or(false);
        let lifecycle = GitHubAdapter::lifecycle_state(payload, pushed, review_requested);

        // 9. Terminal live state.
        if let Some(lifecycle) = lifecycle {
            if lifecycle.is_integrated() || lifecycle.is_terminal_unintegrated() {
                return self
                    .finalize_terminal_changeset(ctx, lifecycle.is_integrated(), payload)
                    .await;
            }
        }

        // 10. Pushed with no PR.
        if payload.is_none() && pushed {
            return handle_pushed_without_pr(self, ctx, &issue, &work_branch).await;
        }

        // 11. Local only.
        if payload.is_none() && !pushed {
            return self.handle_local_only(ctx, &issue, &work_branch).await;
        }

        // 12. PR payload exists: align base, then review-pending.
        if let Some(payload) = payload {
            if let Err(reason) = align_existing_pr_base(self, ctx, &issue, payload).await {
                let _ = self.mutator.mark_blocked(&ctx.changeset_id, &reason).await;
                return FinalizeResult::stop("changeset_pr_base_alignment_failed");
            }
            return FinalizeResult::keep_going("changeset_review_pending");
        }

        // 13. Default.
        FinalizeResult::keep_going("changeset_published")
    }

    async fn handle_terminal_label(
        &self,
        ctx: &FinalizePipelineContext,
        issue: &Issue,
    ) -> FinalizeResult {
        let has_integration_signal = crate::lineage::field_present(issue, "changeset.integrated_sha");
        if issue.has_label("cs:merged") && !has_integration_signal {
            return recover_premature_merged_changeset(self, ctx, issue).await;
        }

        let is_merged = issue.has_label("cs:merged");
        self.finalize_terminal_changeset(ctx, is_merged, None).await
    }

    async fn finalize_terminal_changeset(
        &self,
        ctx: &FinalizePipelineContext,
        integrated: bool,
        payload: Option<&crate::github::PrPayload>,
    ) -> FinalizeResult {
        if integrated {
            let _ = self.mutator.mark_merged(&ctx.changeset_id).await;
        } else {
            let _ = self.mutator.mark_abandoned(&ctx.changeset_id).await;
        }

        if let Some(payload) = payload {
            let _ = self
                .mutator
                .update_review_metadata(
                    &ctx.changeset_id,
                    ReviewMetadata {
                        pr_url: Some(payload.url.clone()),
                        pr_number: Some(payload.number.to_string()),
                        pr_state: Some(payload.state.clone()),
                        review_owner: None,
                    },
                )
                .await;
        }

        let _ = self
            .mutator
            .close_completed_container_changesets(&ctx.epic_id)
            .await;

        run_epic_rollup(self, ctx).await
    }

    /// Step 4 — stack-integrity preflight under `sequential` strategy: the
    /// dependency parent's live PR state must be compatible with opening
    /// this changeset's PR, per `pr_strategy_decision`.
    async fn stack_integrity_preflight(
        &self,
        ctx: &FinalizePipelineContext,
        issue: &Issue,
    ) -> Option<FinalizeResult> {
        if !ctx.branch_pr {
            return None;
        }

        let strategy = crate::lineage::field(issue, "workspace.pr_strategy");
        if normalize_pr_strategy(strategy.as_deref()) != "sequential" {
            return None;
        }

        let resolution = crate::lineage::resolve_parent_lineage_live(self.store.as_ref(), issue).await;
        if resolution.blocked {
            let reason = resolution.blocker_reason.unwrap_or("dependency-parent-unresolved");
            return Some(self.block_stack_integrity(ctx, reason).await);
        }

        let Some(parent_branch) = resolution.dependency_parent_branch.as_deref() else {
            // No dependency-derived parent under sequential strategy (e.g. an
            // epic root changeset): nothing further to gate.
            return None;
        };

        let Some(repo_slug) = ctx.repo_slug.as_deref() else {
            return Some(self.block_stack_integrity(ctx, "dependency-parent-status-query-failed").await);
        };

        let parent_state = match self.github.lookup_github_pr_status(repo_slug, parent_branch).await {
            PrLookupOutcome::Found(payload) => {
                let payload = payload.as_ref();
                if payload.is_closed() && !payload.is_merged() {
                    return Some(self.block_stack_integrity(ctx, "dependency-parent-pr-closed").await);
                }
                let review_requested = GitHubAdapter::has_review_requests(payload);
                GitHubAdapter::lifecycle_state(Some(payload), true, review_requested)
            }
            PrLookupOutcome::NotFound => {
                return Some(self.block_stack_integrity(ctx, "dependency-parent-pr-missing").await);
            }
            PrLookupOutcome::Error(_) => {
                return Some(self.block_stack_integrity(ctx, "dependency-parent-status-query-failed").await);
            }
        };

        let decision = pr_strategy_decision(strategy.as_deref(), parent_state);
        match decision.action {
            PrAction::OpenNow => None,
            PrAction::Defer | PrAction::Skip => Some(self.block_stack_integrity(ctx, decision.reason).await),
        }
    }

    async fn block_stack_integrity(&self, ctx: &FinalizePipelineContext, reason: &str) -> FinalizeResult {
        let _ = self
            .mutator
            .mark_blocked(&ctx.changeset_id, &format!("sequential stack integrity failed: {reason}"))
            .await;
        FinalizeResult::stop("changeset_stack_integrity_failed")
    }

    async fn handle_local_only(
        &self,
        ctx: &FinalizePipelineContext,
        issue: &Issue,
        work_branch: &str,
    ) -> FinalizeResult {
        match self.git.push(&ctx.repo_root, "origin", work_branch).await {
            Ok(()) => FinalizeResult::keep_going("changeset_publish_pending"),
            Err(e) => {
                let diagnostics = format!(
                    "push failed for {} ({}) from {}: {e}",
                    work_branch,
                    issue.id,
                    ctx.repo_root.display()
                );
                let _ = self.mutator.mark_blocked(&ctx.changeset_id, &diagnostics).await;
                FinalizeResult::stop("changeset_blocked_publish_missing")
            }
        }
    }
}
