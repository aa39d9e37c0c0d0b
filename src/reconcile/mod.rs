//! Reconcile Service (§4.8 / §2.8): a three-phase sweep over non-terminal
//! (and some terminal) changesets that repairs drift between the ticket
//! store and live GitHub/git state without running an agent.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::finalize::{FinalizePipeline, FinalizePipelineContext};
use crate::git::{GitRepository, HistoryMode};
use crate::github::GitHubAdapter;
use crate::lineage::{field_present, work_branch};
use crate::mutator::ChangesetMutator;
use crate::store::TicketStore;
use crate::ticket::Issue;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub actionable: usize,
    pub reconciled: usize,
    pub failed: usize,
}

pub struct ReconcileOptions {
    pub repo_slug: Option<String>,
    pub repo_root: PathBuf,
    pub project_data_dir: PathBuf,
    pub branch_pr: bool,
    pub branch_history: HistoryMode,
}

pub struct ReconcileService {
    store: Arc<dyn TicketStore>,
    github: Arc<GitHubAdapter>,
    git: Arc<GitRepository>,
    mutator: Arc<ChangesetMutator>,
}

impl ReconcileService {
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

    pub async fn run(
        &self,
        options: &ReconcileOptions,
        epic_filter: Option<&str>,
        changeset_filter: Option<&str>,
    ) -> ReconcileReport {
        self.github.clear_runtime_cache().await;

        let all = match self.store.list_all_changesets().await {
            Ok(issues) => issues,
            Err(_) => return ReconcileReport::default(),
        };
        let scoped: Vec<Issue> = all
            .into_iter()
            .filter(|issue| {
                epic_filter
                    .map(|epic| issue.parent_id.as_deref() == Some(epic))
                    .unwrap_or(true)
            })
            .filter(|issue| {
                changeset_filter
                    .map(|changeset| issue.id == changeset)
                    .unwrap_or(true)
            })
            .collect();

        let mut report = ReconcileReport {
            scanned: scoped.len(),
            ..Default::default()
        };

        // Phase 1 — review drift: closed changesets whose live PR is
        // actually still active get reopened.
        let mut reopened_ids = HashSet::new();
        for issue in scoped.iter().filter(|i| i.canonical_status() == Some(crate::ticket::CanonicalStatus::Closed)) {
            let Some(branch) = work_branch(issue) else {
                continue;
            };
            let Some(repo_slug) = options.repo_slug.as_deref() else {
                continue;
            };
            let outcome = self.github.lookup_github_pr_status(repo_slug, &branch).await;
            if let crate::github::PrLookupOutcome::Found(payload) = outcome {
                let lifecycle = crate::github::lifecycle_state(Some(&payload), true, false);
                if lifecycle.map(|l| l.is_active()).unwrap_or(false) {
                    report.actionable += 1;
                    if self.mutator.mark_in_progress(&issue.id).await.is_ok() {
                        report.reconciled += 1;
                        reopened_ids.insert(issue.id.clone());
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        // Phase 2 — integration proofs: process candidates carrying an
        // integrated-sha signal but no terminal label, in dependency order
        // (parents before children) so a parent's rollup sees its children's
        // freshly-applied terminal state.
        let candidates: Vec<&Issue> = scoped
            .iter()
            .filter(|issue| {
                !reopened_ids.contains(&issue.id)
                    && field_present(issue, "changeset.integrated_sha")
                    && !issue.has_label("cs:merged")
                    && !issue.has_label("cs:abandoned")
            })
            .collect();
        let ordered = topological_order(&candidates);

        for issue in ordered {
            report.actionable += 1;
            let pipeline = FinalizePipeline::new(
                self.store.clone(),
                self.github.clone(),
                self.git.clone(),
                self.mutator.clone(),
            );
            let ctx = FinalizePipelineContext {
                changeset_id: issue.id.clone(),
                epic_id: issue.parent_id.clone().unwrap_or_default(),
                agent_id: "reconcile".to_string(),
                agent_bead_id: format!("reconcile-{}", issue.id),
                started_at: chrono::Utc::now(),
                repo_slug: options.repo_slug.clone(),
                repo_root: options.repo_root.clone(),
                project_data_dir: Some(options.project_data_dir.clone()),
                branch_pr: options.branch_pr,
                branch_history: options.branch_history,
                blocking_message_thread_ids: vec![],
            };
            let result = pipeline.run(&ctx).await;
            if result.reason.starts_with("changeset_blocked") || result.reason.ends_with("_failed") {
                report.failed += 1;
            } else {
                report.reconciled += 1;
            }
        }

        // Phase 3 — epic rollup for epics with any reconciled descendant.
        let epics: HashSet<String> = scoped
            .iter()
            .filter_map(|i| i.parent_id.clone())
            .collect();
        for epic_id in epics {
            let _ = self.mutator.close_completed_container_changesets(&epic_id).await;
        }

        report
    }
}

/// Parent-before-child ordering over dependency edges restricted to the
/// candidate set; candidates outside each other's dependency graph keep
/// their original relative order.
fn topological_order<'a>(candidates: &[&'a Issue]) -> Vec<&'a Issue> {
    let ids: HashSet<&str> = candidates.iter().map(|i| i.id.as_str()).collect();
    let mut indegree: HashMap<&str, usize> = candidates.iter().map(|i| (i.id.as_str(), 0)).collect();
    for issue in candidates {
        for dep in issue.dependency_ids() {
            if ids.contains(dep.as_str()) {
                *indegree.get_mut(issue.id.as_str()).unwrap() += 1;
            }
        }
    }

    let mut remaining: Vec<&Issue> = candidates.to_vec();
    let mut ordered = Vec::with_capacity(candidates.len());
    while !remaining.is_empty() {
        let mut progressed = false;
        let mut next_round = Vec::new();
        for issue in remaining {
            if indegree.get(issue.id.as_str()).copied().unwrap_or(0) == 0 {
                ordered.push(issue);
                progressed = true;
                for other in candidates {
                    if other.dependency_ids().iter().any(|d| d == &issue.id) {
                        if let Some(entry) = indegree.get_mut(other.id.as_str()) {
                            *entry = entry.saturating_sub(1);
                        }
                    }
                }
            } else {
                next_round.push(issue);
            }
        }
        if !progressed {
            ordered.extend(next_round);
            break;
        }
        remaining = next_round;
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as StdHashSet;

    fn issue(id: &str, deps: Vec<&str>) -> Issue {
        Issue {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status_raw: "open".to_string(),
            issue_type_raw: Some("task".to_string()),
            labels: StdHashSet::new(),
            assignee: None,
            parent_id: Some("epic-1".to_string()),
            dependencies: deps
                .into_iter()
                .map(|id| crate::ticket::Dependency {
                    id: id.to_string(),
                    relation: None,
                })
                .collect(),
        }
    }

    #[test]
    fn topological_order_places_dependencies_first() {
        let c1 = issue("c1", vec![]);
        let c2 = issue("c2", vec!["c1"]);
        let candidates = vec![&c2, &c1];
        let ordered = topological_order(&candidates);
        let ids: Vec<&str> = ordered.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
