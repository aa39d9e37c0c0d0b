//! §4.7.1 — Premature-merged recovery: a changeset carries `cs:merged` but
//! no `changeset.integrated_sha` was ever recorded, meaning the label was
//! set out of band (manual edit, racing worker) rather than by this
//! pipeline's own terminal-state path.

use crate::github::PrLookupOutcome;
use crate::lineage::work_branch;
use crate::mutator::ReviewMetadata;
use crate::ticket::Issue;

use super::{FinalizePipeline, FinalizePipelineContext, FinalizeResult};

pub async fn recover_premature_merged_changeset(
    pipeline: &FinalizePipeline,
    ctx: &FinalizePipelineContext,
    issue: &Issue,
) -> FinalizeResult {
    let Some(branch) = work_branch(issue) else {
        let _ = pipeline
            .mutator
            .mark_blocked(&ctx.changeset_id, "missing changeset.work_branch metadata")
            .await;
        return FinalizeResult::stop("changeset_blocked_missing_metadata");
    };
    let Some(repo_slug) = ctx.repo_slug.as_deref() else {
        return FinalizeResult::stop("changeset_pr_missing_repo_slug");
    };

    let outcome = pipeline.github.lookup_github_pr_status(repo_slug, &branch).await;
    match outcome {
        PrLookupOutcome::Found(payload) if payload.is_merged() => {
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
            FinalizeResult::keep_going("changeset_complete")
        }
        PrLookupOutcome::Error(_) => FinalizeResult::stop("changeset_pr_status_query_failed"),
        _ => {
            // Label was set without a corresponding merged PR: the only
            // safe recovery is to fall back to blocked and let a human or
            // subsequent cycle re-evaluate the real state.
            let _ = pipeline
                .mutator
                .mark_blocked(
                    &ctx.changeset_id,
                    "cs:merged label present without a corresponding merged PR or integrated_sha",
                )
                .await;
            FinalizeResult::stop("changeset_stack_integrity_failed")
        }
    }
}
