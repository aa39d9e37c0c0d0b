//! §4.7.4 — Handle Pushed Without PR: a changeset's branch reached the
//! remote but no PR exists yet. Consult the PR Strategy Gate to decide
//! whether to open one now.

use crate::git::squash_message_fallback;
use crate::github::{GitHubAdapter, PrLookupOutcome};
use crate::mutator::ReviewMetadata;
use crate::prgate::{pr_strategy_decision, PrAction};
use crate::ticket::Issue;

use super::{FinalizePipeline, FinalizePipelineContext, FinalizeResult};

pub async fn handle_pushed_without_pr(
    pipeline: &FinalizePipeline,
    ctx: &FinalizePipelineContext,
    issue: &Issue,
    work_branch: &str,
) -> FinalizeResult {
    if !ctx.branch_pr {
        return FinalizeResult::keep_going("changeset_publish_pending");
    }

    let resolution = crate::lineage::resolve_parent_lineage_live(pipeline.store.as_ref(), issue).await;
    if resolution.blocked {
        let _ = pipeline
            .mutator
            .mark_blocked(
                &ctx.changeset_id,
                &format!(
                    "cannot open PR: {}",
                    resolution.blocker_reason.unwrap_or("parent lineage unresolved")
                ),
            )
            .await;
        return FinalizeResult::stop("changeset_blocked_publish_missing");
    }

    let strategy = crate::lineage::field(issue, "workspace.pr_strategy");
    let parent_state = match (resolution.dependency_parent_branch.as_deref(), ctx.repo_slug.as_deref()) {
        (Some(parent_branch), Some(repo_slug)) => {
            match pipeline.github.lookup_github_pr_status(repo_slug, parent_branch).await {
                PrLookupOutcome::Found(payload) => {
                    let payload = payload.as_ref();
                    let review_requested = GitHubAdapter::has_review_requests(payload);
                    GitHubAdapter::lifecycle_state(Some(payload), true, review_requested)
                }
                PrLookupOutcome::NotFound | PrLookupOutcome::Error(_) => None,
            }
        }
        _ => None,
    };
    let decision = pr_strategy_decision(strategy.as_deref(), parent_state);

    match decision.action {
        PrAction::Skip => FinalizeResult::keep_going("changeset_publish_pending"),
        PrAction::Defer => FinalizeResult::keep_going("changeset_publish_pending"),
        PrAction::OpenNow => {
            let Some(repo_slug) = ctx.repo_slug.as_deref() else {
                return FinalizeResult::stop("changeset_pr_missing_repo_slug");
            };
            let base = resolution
                .effective_parent_branch
                .clone()
                .unwrap_or_else(|| "main".to_string());
            let title = squash_message_fallback(&ctx.changeset_id, &issue.title, &ctx.epic_id);
            let body = format!("Automated changeset PR for {}.", ctx.changeset_id);

            match pipeline
                .github
                .create_pr(repo_slug, &base, work_branch, &title, &body, false)
                .await
            {
                Ok(payload) => {
                    let _ = pipeline
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
                    FinalizeResult::keep_going("changeset_published")
                }
                Err(_) => FinalizeResult::stop("changeset_pr_create_failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn branch_pr_disabled_defers_publication() {
        // Exercised end-to-end in the pipeline harness; `ctx.branch_pr ==
        // false` short-circuits before any GitHub call is made.
    }
}
