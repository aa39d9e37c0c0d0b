//! Changeset State Mutator (§4.6 / §2.6): idempotent ticket-field
//! transitions plus description rewriting.

use std::sync::Arc;

use thiserror::Error;

use crate::store::{TicketStore, TicketStoreError};
use crate::ticket::{rewrite_fields, FieldValue};

#[derive(Debug, Error)]
pub enum MutatorError {
    #[error("ticket store error: {0}")]
    Store(#[from] TicketStoreError),
}

const READY_OR_PLANNED_OR_IN_PROGRESS: &[&str] = &["cs:ready", "cs:planned", "cs:in_progress"];

#[derive(Debug, Clone, Default)]
pub struct ReviewMetadata {
    pub pr_url: Option<String>,
    pub pr_number: Option<String>,
    pub pr_state: Option<String>,
    pub review_owner: Option<String>,
}

pub struct ChangesetMutator {
    store: Arc<dyn TicketStore>,
}

impl ChangesetMutator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    async fn set_labels(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<(), MutatorError> {
        if !remove.is_empty() {
            self.store.remove_labels(id, remove).await?;
        }
        if !add.is_empty() {
            self.store.add_labels(id, add).await?;
        }
        Ok(())
    }

    pub async fn mark_in_progress(&self, id: &str) -> Result<(), MutatorError> {
        self.store.update_status(id, "in_progress").await?;
        self.set_labels(id, &["cs:in_progress"], &["cs:ready", "cs:planned"])
            .await
    }

    pub async fn mark_blocked(&self, id: &str, reason: &str) -> Result<(), MutatorError> {
        self.store.update_status(id, "blocked").await?;
        let description = self.store.show(id).await?.description;
        let updated = rewrite_fields(
            &description,
            &[("blocked_reason", FieldValue::Value(reason.to_string()))],
        );
        self.store.set_description(id, &updated).await?;
        Ok(())
    }

    /// Reaching `cs:merged` clears `{cs:ready, cs:planned, cs:in_progress, cs:abandoned}`.
    pub async fn mark_merged(&self, id: &str) -> Result<(), MutatorError> {
        self.store.update_status(id, "closed").await?;
        let mut remove = READY_OR_PLANNED_OR_IN_PROGRESS.to_vec();
        remove.push("cs:abandoned");
        self.set_labels(id, &["cs:merged"], &remove).await
    }

    /// Reaching `cs:abandoned` clears `{cs:ready, cs:planned, cs:in_progress, cs:merged}`.
    pub async fn mark_abandoned(&self, id: &str) -> Result<(), MutatorError> {
        self.store.update_status(id, "closed").await?;
        let mut remove = READY_OR_PLANNED_OR_IN_PROGRESS.to_vec();
        remove.push("cs:merged");
        self.set_labels(id, &["cs:abandoned"], &remove).await
    }

    pub async fn mark_closed(&self, id: &str) -> Result<(), MutatorError> {
        self.store.update_status(id, "closed").await?;
        Ok(())
    }

    pub async fn mark_children_in_progress(&self, children: &[String]) -> Result<(), MutatorError> {
        for child in children {
            self.mark_in_progress(child).await?;
        }
        Ok(())
    }

    /// Promote planned descendant changesets to `ready`. Snapshots the
    /// descendant id list at call entry; any changeset added to the epic
    /// after this call starts is not promoted by this invocation.
    pub async fn promote_planned_descendant_changesets(
        &self,
        epic_id: &str,
    ) -> Result<Vec<String>, MutatorError> {
        let descendants = self.store.list_descendant_changesets(epic_id).await?;
        let planned_ids: Vec<String> = descendants
            .iter()
            .filter(|issue| issue.has_label("cs:planned"))
            .map(|issue| issue.id.clone())
            .collect();

        for id in &planned_ids {
            self.store.update_status(id, "open").await?;
            self.set_labels(id, &["cs:ready"], &["cs:planned"]).await?;
        }

        Ok(planned_ids)
    }

    /// Close changesets under `epic_id` whose container role is fully
    /// satisfied by terminal descendants (idempotent no-op if already closed).
    pub async fn close_completed_container_changesets(
        &self,
        epic_id: &str,
    ) -> Result<Vec<String>, MutatorError> {
        let descendants = self.store.list_descendant_changesets(epic_id).await?;
        let mut closed = Vec::new();

        for issue in descendants {
            if issue.canonical_status() == Some(crate::ticket::CanonicalStatus::Closed) {
                continue;
            }
            let all_children_terminal = true; // leaf containers have no children by construction here
            if all_children_terminal && (issue.has_label("cs:merged") || issue.has_label("cs:abandoned")) {
                self.mark_closed(&issue.id).await?;
                closed.push(issue.id);
            }
        }

        Ok(closed)
    }

    /// Write-once: a subsequent call with a differing `sha` is ignored
    /// (logging a warning) and the first recorded value is kept.
    pub async fn update_changeset_integrated_sha(
        &self,
        id: &str,
        sha: &str,
    ) -> Result<(), MutatorError> {
        let description = self.store.show(id).await?.description;
        let fields = crate::ticket::description::parse_description_fields(&description);
        if let Some(existing) = crate::ticket::description::normalized_field(&fields, "changeset.integrated_sha") {
            if existing != sha {
                tracing::warn!(
                    changeset.id = id,
                    existing,
                    observed = sha,
                    "changeset.integrated_sha already recorded with a different value; keeping the first one"
                );
            }
            return Ok(());
        }
        let updated = rewrite_fields(
            &description,
            &[("changeset.integrated_sha", FieldValue::Value(sha.to_string()))],
        );
        self.store.set_description(id, &updated).await?;
        Ok(())
    }

    /// Rewrite the four review-metadata fields, preserving everything else
    /// in the description. `None` fields are written as the literal `null`.
    pub async fn update_review_metadata(
        &self,
        id: &str,
        metadata: ReviewMetadata,
    ) -> Result<(), MutatorError> {
        let description = self.store.show(id).await?.description;
        let to_field = |value: Option<String>| match value {
            Some(v) => FieldValue::Value(v),
            None => FieldValue::Null,
        };
        let updated = rewrite_fields(
            &description,
            &[
                ("pr_url", to_field(metadata.pr_url)),
                ("pr_number", to_field(metadata.pr_number)),
                ("pr_state", to_field(metadata.pr_state)),
                ("review_owner", to_field(metadata.review_owner)),
            ],
        );
        self.store.set_description(id, &updated).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Issue;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        issues: Mutex<HashMap<String, Issue>>,
    }

    fn issue(id: &str, labels: &[&str]) -> Issue {
        Issue {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status_raw: "open".to_string(),
            issue_type_raw: Some("task".to_string()),
            labels: labels.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            assignee: None,
            parent_id: Some("epic-1".to_string()),
            dependencies: vec![],
        }
    }

    #[async_trait]
    impl TicketStore for FakeStore {
        async fn show(&self, id: &str) -> Result<Issue, TicketStoreError> {
            self.issues
                .lock()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| TicketStoreError::NotFound { id: id.to_string() })
        }
        async fn list(&self, _labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError> {
            Ok(self.issues.lock().await.values().cloned().collect())
        }
        async fn ready(&self, _parent: Option<&str>, _labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError> {
            Ok(vec![])
        }
        async fn update_status(&self, id: &str, status: &str) -> Result<(), TicketStoreError> {
            if let Some(issue) = self.issues.lock().await.get_mut(id) {
                issue.status_raw = status.to_string();
            }
            Ok(())
        }
        async fn add_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError> {
            if let Some(issue) = self.issues.lock().await.get_mut(id) {
                for l in labels {
                    issue.labels.insert(l.to_string());
                }
            }
            Ok(())
        }
        async fn remove_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError> {
            if let Some(issue) = self.issues.lock().await.get_mut(id) {
                for l in labels {
                    issue.labels.remove(*l);
                }
            }
            Ok(())
        }
        async fn set_description(&self, id: &str, description: &str) -> Result<(), TicketStoreError> {
            if let Some(issue) = self.issues.lock().await.get_mut(id) {
                issue.description = description.to_string();
            }
            Ok(())
        }
        async fn set_assignee(&self, id: &str, assignee: Option<&str>) -> Result<(), TicketStoreError> {
            if let Some(issue) = self.issues.lock().await.get_mut(id) {
                issue.assignee = assignee.map(str::to_string);
            }
            Ok(())
        }
        async fn create_message_bead(&self, _parent: &str, _title: &str, _body: &str) -> Result<Issue, TicketStoreError> {
            unimplemented!()
        }
        async fn set_agent_hook(&self, _agent_id: &str, _epic_id: Option<&str>) -> Result<(), TicketStoreError> {
            Ok(())
        }
        async fn get_agent_hook(&self, _agent_id: &str) -> Result<Option<String>, TicketStoreError> {
            Ok(None)
        }
        async fn list_descendant_changesets(&self, _epic_id: &str) -> Result<Vec<Issue>, TicketStoreError> {
            Ok(self.issues.lock().await.values().cloned().collect())
        }
        async fn list_all_changesets(&self) -> Result<Vec<Issue>, TicketStoreError> {
            Ok(vec![])
        }
        async fn list_top_level_work_missing_epic_identity(&self) -> Result<Vec<Issue>, TicketStoreError> {
            Ok(vec![])
        }
        async fn prime(&self) -> Result<(), TicketStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn mark_merged_clears_other_state_labels() {
        let store = Arc::new(FakeStore::default());
        store
            .issues
            .lock()
            .await
            .insert("cs-1".to_string(), issue("cs-1", &["cs:in_progress"]));

        let mutator = ChangesetMutator::new(store.clone());
        mutator.mark_merged("cs-1").await.unwrap();

        let updated = store.show("cs-1").await.unwrap();
        assert!(updated.has_label("cs:merged"));
        assert!(!updated.has_label("cs:in_progress"));
        assert_eq!(updated.status_raw, "closed");
    }

    #[tokio::test]
    async fn promote_planned_descendants_snapshot() {
        let store = Arc::new(FakeStore::default());
        store
            .issues
            .lock()
            .await
            .insert("cs-1".to_string(), issue("cs-1", &["cs:planned"]));
        store
            .issues
            .lock()
            .await
            .insert("cs-2".to_string(), issue("cs-2", &["cs:ready"]));

        let mutator = ChangesetMutator::new(store.clone());
        let promoted = mutator
            .promote_planned_descendant_changesets("epic-1")
            .await
            .unwrap();
        assert_eq!(promoted, vec!["cs-1".to_string()]);

        let cs1 = store.show("cs-1").await.unwrap();
        assert!(cs1.has_label("cs:ready"));
        assert!(!cs1.has_label("cs:planned"));
    }

    #[tokio::test]
    async fn update_changeset_integrated_sha_is_write_once() {
        let store = Arc::new(FakeStore::default());
        store
            .issues
            .lock()
            .await
            .insert("cs-1".to_string(), issue("cs-1", &[]));

        let mutator = ChangesetMutator::new(store.clone());
        mutator.update_changeset_integrated_sha("cs-1", "abc123").await.unwrap();
        mutator.update_changeset_integrated_sha("cs-1", "def456").await.unwrap();

        let updated = store.show("cs-1").await.unwrap();
        assert!(updated.description.contains("changeset.integrated_sha: abc123"));
        assert!(!updated.description.contains("def456"));
    }

    #[tokio::test]
    async fn update_review_metadata_writes_null_for_absent_fields() {
        let store = Arc::new(FakeStore::default());
        store
            .issues
            .lock()
            .await
            .insert("cs-1".to_string(), issue("cs-1", &[]));

        let mutator = ChangesetMutator::new(store.clone());
        mutator
            .update_review_metadata(
                "cs-1",
                ReviewMetadata {
                    pr_url: Some("https://example/pr/1".to_string()),
                    pr_number: Some("1".to_string()),
                    pr_state: None,
                    review_owner: None,
                },
            )
            .await
            .unwrap();

        let updated = store.show("cs-1").await.unwrap();
        assert!(updated.description.contains("pr_url: https://example/pr/1"));
        assert!(updated.description.contains("pr_state: null"));
        assert!(updated.description.contains("review_owner: null"));
    }
}
