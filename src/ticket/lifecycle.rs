//! Pure role/lifecycle inference over ticket payloads.
//!
//! Functions here never perform IO; callers pass in whatever graph context
//! they already have (e.g. `has_work_children`) rather than this module
//! reaching back into a store.

use super::model::{CanonicalStatus, Issue, IssueType};

/// Review lifecycle taxonomy over a branch/PR pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewLifecycle {
    LocalOnly,
    Pushed,
    DraftPr,
    PrOpen,
    InReview,
    Approved,
    Merged,
    Closed,
}

impl ReviewLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local-only",
            Self::Pushed => "pushed",
            Self::DraftPr => "draft-pr",
            Self::PrOpen => "pr-open",
            Self::InReview => "in-review",
            Self::Approved => "approved",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local-only" => Some(Self::LocalOnly),
            "pushed" => Some(Self::Pushed),
            "draft-pr" => Some(Self::DraftPr),
            "pr-open" => Some(Self::PrOpen),
            "in-review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Active (non-terminal, open) review states.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pushed | Self::DraftPr | Self::PrOpen | Self::InReview | Self::Approved
        )
    }

    pub fn is_integrated(&self) -> bool {
        matches!(self, Self::Merged)
    }

    pub fn is_terminal_unintegrated(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Normalize a raw `pr_state` description field into the taxonomy.
pub fn normalize_review_state(raw: Option<&str>) -> Option<ReviewLifecycle> {
    raw.and_then(ReviewLifecycle::parse)
}

/// Work-bead identity: `issue_type` in the work set, or explicit `at:epic`.
pub fn is_work(issue: &Issue) -> bool {
    issue
        .issue_type()
        .map(|t| t.is_work_type())
        .unwrap_or(true)
        || issue.has_label("at:epic")
}

pub fn is_epic(issue: &Issue) -> bool {
    is_work(issue) && issue.parent_id.is_none()
}

/// `has_work_children`: `Some(true/false)` when known, `None` when the
/// caller couldn't determine graph shape — conservative decisions should
/// treat `None` as "not ready" per the spec.
pub fn is_changeset(issue: &Issue, has_work_children: Option<bool>) -> bool {
    is_work(issue) && !has_work_children.unwrap_or(true)
}

/// Rejection reason strings. Callers surface these but never infer
/// "success" from their absence alone — check the boolean result too.
pub type RejectionReasons = Vec<&'static str>;

/// Evaluate whether a changeset is a runnable leaf, returning diagnostics
/// either way.
pub fn runnable_leaf(
    issue: &Issue,
    has_work_children: Option<bool>,
) -> (bool, RejectionReasons) {
    let mut reasons = Vec::new();
    if !is_work(issue) {
        reasons.push("not-work-bead");
    }
    if !is_changeset(issue, has_work_children) {
        reasons.push("not-leaf-work");
    }
    match issue.canonical_status() {
        Some(CanonicalStatus::Open) => {}
        Some(_) => reasons.push("status-not-open"),
        None => reasons.push("status=missing"),
    }
    (reasons.is_empty(), reasons)
}

/// `dependency_issue_satisfied` — true when the dependency is closed AND
/// (not `require_integrated`, OR it isn't a changeset, OR it carries
/// `cs:merged`, OR its review state is integrated).
pub fn dependency_issue_satisfied(
    status: Option<CanonicalStatus>,
    labels: &std::collections::HashSet<String>,
    require_integrated: bool,
    review_state: Option<ReviewLifecycle>,
    issue_type: Option<IssueType>,
    has_work_children: Option<bool>,
) -> bool {
    if status != Some(CanonicalStatus::Closed) {
        return false;
    }
    if !require_integrated {
        return true;
    }
    let is_changeset_role = issue_type.map(|t| t.is_work_type()).unwrap_or(true)
        && !has_work_children.unwrap_or(true);
    if !is_changeset_role {
        return true;
    }
    if labels.contains("cs:merged") {
        return true;
    }
    review_state.map(|s| s.is_integrated()).unwrap_or(false)
}
