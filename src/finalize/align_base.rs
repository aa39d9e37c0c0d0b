//! §4.7.5 — Align Existing PR Base: keep an already-open PR's base ref in
//! sync with the changeset's resolved effective parent branch.

use crate::github::PrPayload;
use crate::ticket::Issue;

use super::{FinalizePipeline, FinalizePipelineContext};

/// Returns `Ok(())` when the base is already aligned or was successfully
/// retargeted; `Err(reason)` when retargeting failed or the payload's
/// `baseRefName` diverges from lineage with no way to reconcile it.
pub async fn align_existing_pr_base(
    pipeline: &FinalizePipeline,
    ctx: &FinalizePipelineContext,
    issue: &Issue,
    payload: &PrPayload,
) -> Result<(), String> {
    let resolution = crate::lineage::resolve_parent_lineage_live(pipeline.store.as_ref(), issue).await;
    if resolution.blocked {
        return Err(format!(
            "parent lineage blocked: {}",
            resolution.blocker_reason.unwrap_or("unknown")
        ));
    }

    let Some(expected_base) = resolution.effective_parent_branch else {
        // No resolvable parent branch (e.g. epic root changeset) — nothing
        // to align; the default branch is the correct base.
        return Ok(());
    };

    if payload.base_ref_name == expected_base {
        return Ok(());
    }

    let Some(repo_slug) = ctx.repo_slug.as_deref() else {
        return Err("missing repo slug; cannot retarget PR base".to_string());
    };

    pipeline
        .github
        .retarget_pr_base(repo_slug, payload.number, &expected_base)
        .await
        .map_err(|e| format!("failed to retarget PR #{} base to {expected_base}: {e}", payload.number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn issue_with_parent(parent_branch: &str) -> Issue {
        Issue {
            id: "cs-1".into(),
            title: "t".into(),
            description: format!("changeset.parent_branch: {parent_branch}\n"),
            status_raw: "open".into(),
            issue_type_raw: Some("task".into()),
            labels: HashSet::new(),
            assignee: None,
            parent_id: Some("epic-1".into()),
            dependencies: vec![],
        }
    }

    fn payload_with_base(base: &str) -> PrPayload {
        PrPayload {
            number: 1,
            url: "https://github.com/o/r/pull/1".into(),
            state: "OPEN".into(),
            base_ref_name: base.into(),
            head_ref_name: "agent/cs-1".into(),
            title: String::new(),
            body: String::new(),
            is_draft: false,
            merged_at: None,
            closed_at: None,
            updated_at: None,
            review_decision: None,
            mergeable: None,
            merge_state_status: None,
            review_requests: vec![],
            comments: vec![],
            reviews: vec![],
        }
    }

    #[test]
    fn already_aligned_base_is_a_noop_decision() {
        let issue = issue_with_parent("agent/epic-1-root");
        let payload = payload_with_base("agent/epic-1-root");
        let resolution = crate::lineage::resolve_parent_lineage(&issue, None, None);
        assert_eq!(
            resolution.effective_parent_branch.as_deref(),
            Some("agent/epic-1-root")
        );
        assert_eq!(payload.base_ref_name, "agent/epic-1-root");
    }
}
