//! §4.9.1 — `next_changeset(epic)`: pick the next runnable changeset within
//! a claimed epic.

use crate::ticket::{runnable_leaf, CanonicalStatus, Issue};

/// `descendants` is every non-terminal changeset under `epic`, already
/// loaded by the caller (the Worker Session Runner primes this once per
/// cycle). Returns `None` when nothing in the epic is currently runnable.
pub fn next_changeset<'a>(epic: &'a Issue, descendants: &'a [Issue]) -> Option<&'a Issue> {
    // Top-level leaf shortcut: the epic itself has no children yet, so it is
    // its own changeset.
    if descendants.is_empty() {
        let (ok, _) = runnable_leaf(epic, Some(false));
        return if ok { Some(epic) } else { None };
    }

    let has_open_descendant = |issue: &Issue| -> bool {
        descendants.iter().any(|d| {
            d.parent_id.as_deref() == Some(issue.id.as_str())
                && d.canonical_status() != Some(CanonicalStatus::Closed)
        })
    };

    let mut candidates: Vec<&Issue> = descendants
        .iter()
        .filter(|issue| {
            if has_open_descendant(issue) {
                return false;
            }
            if issue.has_label("at:unread") {
                return false;
            }
            let (ok, _) = runnable_leaf(issue, Some(false));
            ok || issue.has_label("cs:in_progress")
        })
        .collect();

    candidates.sort_by(|a, b| {
        let a_in_progress = a.has_label("cs:in_progress");
        let b_in_progress = b.has_label("cs:in_progress");
        b_in_progress.cmp(&a_in_progress).then_with(|| a.id.cmp(&b.id))
    });

    candidates.into_iter().next()
}
