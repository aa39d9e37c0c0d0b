//! Startup Contract & Selection (§4.9 / §2.9): the ordered epic-selection
//! decision tree a worker session runs before claiming any work.

mod next_changeset;

pub use next_changeset::next_changeset;

use std::sync::Arc;

use crate::github::{GitHubAdapter, PrLookupOutcome};
use crate::store::{TicketStore, TicketStoreError};
use crate::ticket::{Issue, ReviewLifecycle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    Auto,
    Prompt,
}

/// Result of a startup-contract selection pass, mirroring the spec's
/// `StartupContractResult` data model.
#[derive(Debug, Clone)]
pub struct StartupContractResult {
    pub epic: Option<Box<Issue>>,
    pub changeset_id: Option<String>,
    pub should_exit: bool,
    pub reason: &'static str,
    pub reassign_from: Option<String>,
}

impl StartupContractResult {
    fn selected(epic: Issue, reason: &'static str) -> Self {
        Self {
            epic: Some(Box::new(epic)),
            changeset_id: None,
            should_exit: false,
            reason,
            reassign_from: None,
        }
    }

    fn reclaimed(epic: Issue, reason: &'static str, reassign_from: String) -> Self {
        Self {
            epic: Some(Box::new(epic)),
            changeset_id: None,
            should_exit: false,
            reason,
            reassign_from: Some(reassign_from),
        }
    }

    fn exit(reason: &'static str) -> Self {
        Self {
            epic: None,
            changeset_id: None,
            should_exit: true,
            reason,
            reassign_from: None,
        }
    }
}

pub struct StartupOptions {
    pub explicit_epic_id: Option<String>,
    pub queue_only: bool,
    pub agent_id: String,
    pub repo_slug: Option<String>,
    pub selection_policy: SelectionPolicy,
}

pub struct StartupContract {
    store: Arc<dyn TicketStore>,
    github: Arc<GitHubAdapter>,
}

/// `atelier/worker/<kind>/p<pid>-t<token>` collapsed to its first three
/// segments: the worker-kind/session family an agent id belongs to,
/// independent of the trailing process token.
fn agent_family_id(agent_id: &str) -> String {
    let segments: Vec<&str> = agent_id.split('/').collect();
    if segments.len() >= 3 {
        segments[..3].join("/")
    } else {
        agent_id.to_string()
    }
}

impl StartupContract {
    pub fn new(store: Arc<dyn TicketStore>, github: Arc<GitHubAdapter>) -> Self {
        Self { store, github }
    }

    /// Run the 12-step ordered selection.
    pub async fn select_epic(
        &self,
        options: &StartupOptions,
    ) -> Result<StartupContractResult, TicketStoreError> {
        // 1. Explicit epic.
        if let Some(epic_id) = &options.explicit_epic_id {
            if let Ok(epic) = self.store.show(epic_id).await {
                return Ok(StartupContractResult::selected(epic, "explicit_epic"));
            }
        }

        // 2. queue_only exits before any claim is made.
        if options.queue_only {
            return Ok(StartupContractResult::exit("queue_only"));
        }

        // 3. Load candidates: all epics not closed/abandoned.
        let all = self.store.list(&["at:epic"]).await?;
        let candidates: Vec<Issue> = all
            .into_iter()
            .filter(|issue| issue.canonical_status() != Some(crate::ticket::CanonicalStatus::Closed))
            .collect();
        if candidates.is_empty() {
            return Ok(StartupContractResult::exit("no_eligible_epics"));
        }

        // 4. Hooked epic: this agent already has a claimed epic.
        if let Some(hooked_id) = self.store.get_agent_hook(&options.agent_id).await? {
            if let Some(epic) = candidates.iter().find(|e| e.id == hooked_id) {
                return Ok(StartupContractResult::selected(epic.clone(), "hooked_epic"));
            }
        }

        // 5. Review-feedback priority: an epic with a changeset under live
        // review awaiting the agent's response.
        if let Some(epic) = self
            .review_feedback_epic(&candidates, options.repo_slug.as_deref())
            .await
        {
            return Ok(StartupContractResult::selected(epic.clone(), "review_feedback"));
        }

        // 6. Oldest assigned epic (stable input order is assumed oldest-first,
        // as the store returns creation order).
        if let Some(epic) = candidates.iter().find(|e| e.assignee.is_some()) {
            return Ok(StartupContractResult::selected(epic.clone(), "assigned_epic"));
        }

        // 7. Stale-family reclaim: an epic assigned to a different agent id
        // from this agent's own worker-kind/session family whose hook no
        // longer points back at it (the prior instance died or rotated
        // without releasing the claim).
        if let Some((epic, previous_assignee)) = self
            .stale_family_reclaim_candidate(&candidates, &options.agent_id)
            .await
        {
            return Ok(StartupContractResult::reclaimed(
                epic,
                "stale_assignee_epic",
                previous_assignee,
            ));
        }

        // 8. Inbox gate: unread top-level messages block new claims until
        // triaged.
        let inbox = self.store.list(&["at:message", "at:unread"]).await?;
        if !inbox.is_empty() {
            return Ok(StartupContractResult::exit("inbox_blocked"));
        }

        // 9. Queue gate: untriaged top-level work blocks new epic selection.
        let missing_identity = self.store.list_top_level_work_missing_epic_identity().await?;
        if !missing_identity.is_empty() {
            return Ok(StartupContractResult::exit("queue_blocked"));
        }

        // 10. Selection policy: auto picks the first ready candidate; prompt
        // defers to an external decision the caller must already have made
        // by supplying an explicit epic id.
        match options.selection_policy {
            SelectionPolicy::Prompt => Ok(StartupContractResult::exit("no_eligible_epics")),
            SelectionPolicy::Auto => {
                let ready = self.store.ready(None, &["at:epic"]).await?;
                match ready.into_iter().next() {
                    Some(epic) => Ok(StartupContractResult::selected(epic, "new_epic")),
                    // 11. Ready-changeset lift / 12. No eligible epics.
                    None => Ok(StartupContractResult::exit("no_eligible_epics")),
                }
            }
        }
    }

    /// §4.9 step 5: an epic has review feedback pending when one of its
    /// descendant changesets carries a live, non-draft PR awaiting the
    /// agent's response (`ReviewLifecycle::InReview`).
    async fn review_feedback_epic<'a>(
        &self,
        candidates: &'a [Issue],
        repo_slug: Option<&str>,
    ) -> Option<&'a Issue> {
        let repo_slug = repo_slug?;
        for epic in candidates {
            if self.epic_has_review_feedback(epic, repo_slug).await {
                return Some(epic);
            }
        }
        None
    }

    async fn epic_has_review_feedback(&self, epic: &Issue, repo_slug: &str) -> bool {
        let Ok(descendants) = self.store.list_descendant_changesets(&epic.id).await else {
            return false;
        };

        for changeset in &descendants {
            if changeset.has_label("at:draft") {
                continue;
            }
            let Some(work_branch) = crate::lineage::work_branch(changeset) else {
                continue;
            };
            let outcome = self.github.lookup_github_pr_status(repo_slug, &work_branch).await;
            if let PrLookupOutcome::Found(payload) = outcome {
                let payload = payload.as_ref();
                let review_requested = GitHubAdapter::has_review_requests(payload);
                let lifecycle = GitHubAdapter::lifecycle_state(Some(payload), true, review_requested);
                if lifecycle == Some(ReviewLifecycle::InReview) {
                    return true;
                }
            }
        }
        false
    }

    /// §4.9 step 7: find an epic assigned to a different agent id in this
    /// agent's own family (same worker kind and session) whose hook no
    /// longer points back at that epic.
    async fn stale_family_reclaim_candidate(
        &self,
        candidates: &[Issue],
        agent_id: &str,
    ) -> Option<(Issue, String)> {
        let family = agent_family_id(agent_id);
        for epic in candidates {
            let Some(assignee) = &epic.assignee else {
                continue;
            };
            if assignee == agent_id {
                continue;
            }
            if agent_family_id(assignee) != family {
                continue;
            }
            let still_hooked = self
                .store
                .get_agent_hook(assignee)
                .await
                .ok()
                .flatten()
                .as_deref()
                == Some(epic.id.as_str());
            if !still_hooked {
                return Some((epic.clone(), assignee.clone()));
            }
        }
        None
    }
}
