//! Wire types for `gh pr view`/`pr list` JSON payloads (§4.4, §6).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ticket::ReviewLifecycle;

#[derive(Debug, Clone, Deserialize)]
pub struct PrReviewRequest {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrComment {
    pub author: PrAuthor,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrReview {
    pub author: PrAuthor,
    #[serde(rename = "submittedAt")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrAuthor {
    #[serde(default)]
    pub login: String,
    #[serde(default, rename = "is_bot")]
    pub is_bot: bool,
}

impl PrAuthor {
    pub fn is_bot_author(&self) -> bool {
        self.is_bot || self.login.ends_with("[bot]") || self.login.ends_with("-bot")
    }
}

/// A single PR's payload, as returned by `gh pr view --json ...`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrPayload {
    pub number: u64,
    pub url: String,
    pub state: String,
    #[serde(rename = "baseRefName")]
    pub base_ref_name: String,
    #[serde(rename = "headRefName")]
    pub head_ref_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "isDraft")]
    pub is_draft: bool,
    #[serde(default, rename = "mergedAt")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "closedAt")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "reviewDecision")]
    pub review_decision: Option<String>,
    #[serde(default)]
    pub mergeable: Option<String>,
    #[serde(default, rename = "mergeStateStatus")]
    pub merge_state_status: Option<String>,
    #[serde(default, rename = "reviewRequests")]
    pub review_requests: Vec<PrReviewRequest>,
    #[serde(default)]
    pub comments: Vec<PrComment>,
    #[serde(default)]
    pub reviews: Vec<PrReview>,
}

impl PrPayload {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.eq_ignore_ascii_case("closed") || self.closed_at.is_some()
    }
}

/// Outcome of a PR lookup by head branch.
#[derive(Debug, Clone)]
pub enum PrLookupOutcome {
    Found(Box<PrPayload>),
    NotFound,
    Error(String),
}

/// Merge-conflict signal from `mergeStateStatus`/`mergeable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeConflictState {
    Clean,
    Conflicting,
    Unknown,
}

pub fn default_branch_has_merge_conflict(payload: &PrPayload) -> MergeConflictState {
    if payload
        .merge_state_status
        .as_deref()
        .map(|s| s.eq_ignore_ascii_case("DIRTY"))
        .unwrap_or(false)
        || payload
            .mergeable
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("CONFLICTING"))
            .unwrap_or(false)
    {
        return MergeConflictState::Conflicting;
    }
    if payload
        .merge_state_status
        .as_deref()
        .map(|s| s.eq_ignore_ascii_case("UNKNOWN"))
        .unwrap_or(false)
        || payload
            .mergeable
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("UNKNOWN"))
            .unwrap_or(false)
    {
        return MergeConflictState::Unknown;
    }
    MergeConflictState::Clean
}

/// `lifecycle_state(payload, pushed, review_requested)` — see §4.4.
pub fn lifecycle_state(
    payload: Option<&PrPayload>,
    pushed: bool,
    review_requested: bool,
) -> Option<ReviewLifecycle> {
    match payload {
        None => {
            if pushed {
                Some(ReviewLifecycle::Pushed)
            } else {
                None
            }
        }
        Some(payload) => {
            if payload.is_merged() {
                Some(ReviewLifecycle::Merged)
            } else if payload.is_closed() {
                Some(ReviewLifecycle::Closed)
            } else if payload.is_draft {
                Some(ReviewLifecycle::DraftPr)
            } else if payload
                .review_decision
                .as_deref()
                .map(|d| d.eq_ignore_ascii_case("APPROVED"))
                .unwrap_or(false)
            {
                Some(ReviewLifecycle::Approved)
            } else if review_requested {
                Some(ReviewLifecycle::InReview)
            } else {
                Some(ReviewLifecycle::PrOpen)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_payload() -> PrPayload {
        PrPayload {
            number: 1,
            url: "https://github.com/o/r/pull/1".into(),
            state: "OPEN".into(),
            base_ref_name: "main".into(),
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
    fn lifecycle_maps_merged_first() {
        let mut payload = base_payload();
        payload.merged_at = Some(Utc::now());
        assert_eq!(
            lifecycle_state(Some(&payload), false, false),
            Some(ReviewLifecycle::Merged)
        );
    }

    #[test]
    fn lifecycle_no_payload_pushed_is_pushed() {
        assert_eq!(lifecycle_state(None, true, false), Some(ReviewLifecycle::Pushed));
        assert_eq!(lifecycle_state(None, false, false), None);
    }

    #[test]
    fn merge_conflict_state_reads_dirty_and_unknown() {
        let mut payload = base_payload();
        payload.merge_state_status = Some("DIRTY".into());
        assert_eq!(
            default_branch_has_merge_conflict(&payload),
            MergeConflictState::Conflicting
        );

        payload.merge_state_status = Some("UNKNOWN".into());
        assert_eq!(
            default_branch_has_merge_conflict(&payload),
            MergeConflictState::Unknown
        );
    }
}
