//! Ticket model and pure lifecycle inference (§4.1 / §2.1).

pub mod description;
pub mod lifecycle;
pub mod model;

pub use description::{rewrite_fields, FieldValue};
pub use lifecycle::{
    dependency_issue_satisfied, is_changeset, is_epic, is_work, normalize_review_state,
    runnable_leaf, ReviewLifecycle,
};
pub use model::{CanonicalStatus, Dependency, Issue, IssueType, RESERVED_LABELS};
