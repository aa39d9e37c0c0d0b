//! End-to-end scenarios wiring the finalize pipeline and startup contract
//! to fake store/command backends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use atelier::external::{CommandError, CommandExecutor, CommandOutput};
use atelier::git::GitRepository;
use atelier::github::GitHubAdapter;
use atelier::mutator::ChangesetMutator;
use atelier::store::TicketStoreError;
use atelier::ticket::{Dependency, Issue};
use atelier::{FinalizePipeline, FinalizePipelineContext, StartupContract, StartupOptions, SelectionPolicy};

#[derive(Default)]
struct FakeStore {
    issues: Mutex<HashMap<String, Issue>>,
    hooks: Mutex<HashMap<String, String>>,
}

impl FakeStore {
    fn with_issues(issues: Vec<Issue>) -> Self {
        let mut map = HashMap::new();
        for issue in issues {
            map.insert(issue.id.clone(), issue);
        }
        Self {
            issues: Mutex::new(map),
            hooks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl atelier::store::TicketStore for FakeStore {
    async fn show(&self, id: &str) -> Result<Issue, TicketStoreError> {
        self.issues
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TicketStoreError::NotFound { id: id.to_string() })
    }

    async fn list(&self, labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError> {
        let issues = self.issues.lock().await;
        Ok(issues
            .values()
            .filter(|issue| labels.iter().all(|l| issue.has_label(l)))
            .cloned()
            .collect())
    }

    async fn ready(&self, _parent: Option<&str>, labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError> {
        self.list(labels).await
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
        Ok(Issue {
            id: "msg-1".to_string(),
            title: "msg".to_string(),
            description: String::new(),
            status_raw: "open".to_string(),
            issue_type_raw: Some("message".to_string()),
            labels: HashSet::new(),
            assignee: None,
            parent_id: None,
            dependencies: vec![],
        })
    }

    async fn set_agent_hook(&self, agent_id: &str, epic_id: Option<&str>) -> Result<(), TicketStoreError> {
        let mut hooks = self.hooks.lock().await;
        match epic_id {
            Some(id) => {
                hooks.insert(agent_id.to_string(), id.to_string());
            }
            None => {
                hooks.remove(agent_id);
            }
        }
        Ok(())
    }

    async fn get_agent_hook(&self, agent_id: &str) -> Result<Option<String>, TicketStoreError> {
        Ok(self.hooks.lock().await.get(agent_id).cloned())
    }

    async fn list_descendant_changesets(&self, epic_id: &str) -> Result<Vec<Issue>, TicketStoreError> {
        let issues = self.issues.lock().await;
        Ok(issues
            .values()
            .filter(|issue| issue.parent_id.as_deref() == Some(epic_id))
            .cloned()
            .collect())
    }

    async fn list_all_changesets(&self) -> Result<Vec<Issue>, TicketStoreError> {
        let issues = self.issues.lock().await;
        Ok(issues.values().filter(|i| i.has_label("at:changeset")).cloned().collect())
    }

    async fn list_top_level_work_missing_epic_identity(&self) -> Result<Vec<Issue>, TicketStoreError> {
        Ok(vec![])
    }

    async fn prime(&self) -> Result<(), TicketStoreError> {
        Ok(())
    }
}

struct FakeCommands {
    responses: Mutex<HashMap<String, Result<CommandOutput, CommandError>>>,
}

impl FakeCommands {
    fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
        }
    }

    async fn expect(&self, program: &str, args: &[&str], stdout: &str) {
        let key = format!("{program} {}", args.join(" "));
        self.responses.lock().await.insert(
            key,
            Ok(CommandOutput {
                status_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        );
    }
}

#[async_trait]
impl CommandExecutor for FakeCommands {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let key = format!("{program} {}", args.join(" "));
        self.responses
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or(Err(CommandError::CommandNotFound {
                command: program.to_string(),
            }))
    }
}

fn changeset(id: &str, parent: &str, description: &str) -> Issue {
    Issue {
        id: id.to_string(),
        title: id.to_string(),
        description: description.to_string(),
        status_raw: "in_progress".to_string(),
        issue_type_raw: Some("task".to_string()),
        labels: HashSet::from(["at:changeset".to_string()]),
        assignee: None,
        parent_id: Some(parent.to_string()),
        dependencies: vec![],
    }
}

/// Scenario 1: a sequential-strategy changeset whose dependency parent's PR
/// is still open must be blocked, not opened.
#[tokio::test]
async fn sequential_strategy_blocks_on_open_parent_pr() {
    let parent = changeset(
        "cs-parent",
        "epic-1",
        "changeset.work_branch: agent/cs-parent\n",
    );
    let mut child = changeset(
        "cs-child",
        "epic-1",
        "changeset.work_branch: agent/cs-child\nworkspace.pr_strategy: sequential\n",
    );
    child.dependencies = vec![Dependency {
        id: "cs-parent".to_string(),
        relation: None,
    }];

    let store: Arc<dyn atelier::store::TicketStore> =
        Arc::new(FakeStore::with_issues(vec![parent, child]));

    let commands = Arc::new(FakeCommands::new());
    commands
        .expect(
            "gh",
            &[
                "pr", "list", "--repo", "o/r", "--head", "agent/cs-parent", "--state", "all",
                "--json", "number,state,updatedAt,closedAt,mergedAt",
            ],
            r#"[{"number":7,"state":"OPEN","updatedAt":"2026-01-01T00:00:00Z"}]"#,
        )
        .await;
    commands
        .expect(
            "gh",
            &[
                "pr", "view", "7", "--repo", "o/r", "--json",
                "number,url,state,baseRefName,headRefName,title,body,labels,isDraft,mergedAt,closedAt,updatedAt,reviewDecision,mergeable,mergeStateStatus,reviewRequests,comments,reviews",
            ],
            r#"{"number":7,"url":"https://github.com/o/r/pull/7","state":"OPEN","baseRefName":"main","headRefName":"agent/cs-parent","title":"parent","body":"","isDraft":false,"mergedAt":null,"closedAt":null,"updatedAt":"2026-01-01T00:00:00Z","reviewDecision":null,"mergeable":"MERGEABLE","mergeStateStatus":"CLEAN","reviewRequests":[],"comments":[],"reviews":[]}"#,
        )
        .await;

    let github = Arc::new(GitHubAdapter::new(commands.clone()));
    let git = Arc::new(GitRepository::new(commands.clone()));
    let mutator = Arc::new(ChangesetMutator::new(store.clone()));
    let pipeline = FinalizePipeline::new(store.clone(), github, git, mutator);

    let ctx = FinalizePipelineContext {
        changeset_id: "cs-child".to_string(),
        epic_id: "epic-1".to_string(),
        agent_id: "atelier/worker/claude/p1-t1".to_string(),
        agent_bead_id: "bead-1".to_string(),
        started_at: chrono::Utc::now(),
        repo_slug: Some("o/r".to_string()),
        repo_root: std::path::PathBuf::from("/repo"),
        project_data_dir: None,
        branch_pr: true,
        branch_history: atelier::HistoryMode::Squash,
        blocking_message_thread_ids: vec![],
    };

    let result = pipeline.run(&ctx).await;
    assert!(!result.continue_running);
    assert_eq!(result.reason, "changeset_stack_integrity_failed");

    let blocked = store.show("cs-child").await.unwrap();
    assert_eq!(blocked.status_raw, "blocked");
    assert!(blocked.description.contains("awaiting-parent-integration"));
}

fn epic(id: &str) -> Issue {
    Issue {
        id: id.to_string(),
        title: id.to_string(),
        description: String::new(),
        status_raw: "open".to_string(),
        issue_type_raw: Some("epic".to_string()),
        labels: HashSet::from(["at:epic".to_string()]),
        assignee: None,
        parent_id: None,
        dependencies: vec![],
    }
}

/// Scenario 6: an epic assigned to a dead agent in the same worker family
/// whose hook no longer points back at it is reclaimed, with
/// `reassign_from` naming the stale assignee.
#[tokio::test]
async fn stale_family_agent_is_reclaimed_on_startup() {
    let mut stale_epic = epic("epic-1");
    stale_epic.assignee = Some("atelier/worker/claude/p111-stale".to_string());

    let store: Arc<dyn atelier::store::TicketStore> = Arc::new(FakeStore::with_issues(vec![stale_epic]));
    let commands = Arc::new(FakeCommands::new());
    let github = Arc::new(GitHubAdapter::new(commands));
    let contract = StartupContract::new(store.clone(), github);

    let result = contract
        .select_epic(&StartupOptions {
            explicit_epic_id: None,
            queue_only: false,
            agent_id: "atelier/worker/claude/p222-fresh".to_string(),
            repo_slug: None,
            selection_policy: SelectionPolicy::Auto,
        })
        .await
        .unwrap();

    assert!(!result.should_exit);
    assert_eq!(result.reason, "stale_assignee_epic");
    assert_eq!(
        result.reassign_from.as_deref(),
        Some("atelier/worker/claude/p111-stale")
    );
    assert_eq!(result.epic.unwrap().id, "epic-1");
}
