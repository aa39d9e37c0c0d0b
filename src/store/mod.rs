//! Ticket store adapter: the opaque `bd` ("beads") CLI, shelled through
//! [`CommandExecutor`] and parsed as JSON (§6 / §2.1 boundary).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::external::command::{CommandError, CommandExecutor};
use crate::ticket::{Dependency, Issue};

#[derive(Debug, Error)]
pub enum TicketStoreError {
    #[error("ticket not found: {id}")]
    NotFound { id: String },
    #[error("malformed ticket payload: {message}")]
    MalformedPayload { message: String },
    #[error("command execution error: {source}")]
    Command {
        #[from]
        source: CommandError,
    },
    #[error("store command failed: {message}")]
    CommandFailed { message: String },
}

/// Abstraction over the `bd` CLI's ticket operations this core actually
/// uses. Every method is a single shelled invocation returning parsed JSON;
/// no method performs retries — transient failures bubble up as
/// [`TicketStoreError::Command`] and are the caller's concern.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn show(&self, id: &str) -> Result<Issue, TicketStoreError>;
    async fn list(&self, labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError>;
    async fn ready(&self, parent: Option<&str>, labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError>;
    async fn update_status(&self, id: &str, status: &str) -> Result<(), TicketStoreError>;
    async fn add_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError>;
    async fn remove_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError>;
    async fn set_description(&self, id: &str, description: &str) -> Result<(), TicketStoreError>;
    async fn set_assignee(&self, id: &str, assignee: Option<&str>) -> Result<(), TicketStoreError>;
    async fn create_message_bead(
        &self,
        parent: &str,
        title: &str,
        body: &str,
    ) -> Result<Issue, TicketStoreError>;
    async fn set_agent_hook(&self, agent_id: &str, epic_id: Option<&str>) -> Result<(), TicketStoreError>;
    async fn get_agent_hook(&self, agent_id: &str) -> Result<Option<String>, TicketStoreError>;
    async fn list_descendant_changesets(&self, epic_id: &str) -> Result<Vec<Issue>, TicketStoreError>;
    async fn list_all_changesets(&self) -> Result<Vec<Issue>, TicketStoreError>;
    async fn list_top_level_work_missing_epic_identity(&self) -> Result<Vec<Issue>, TicketStoreError>;
    async fn prime(&self) -> Result<(), TicketStoreError>;
}

fn field_to_args<'a>(flag: &'static str, values: &'a [&'a str]) -> Vec<&'a str> {
    let mut args = Vec::with_capacity(values.len() * 2);
    for value in values {
        args.push(flag);
        args.push(value);
    }
    args
}

fn parse_dependency(value: &serde_json::Value) -> Option<Dependency> {
    let id = value.get("id")?.as_str()?.to_string();
    let relation = value
        .get("relation")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(Dependency { id, relation })
}

fn parse_issue(value: serde_json::Value) -> Result<Issue, TicketStoreError> {
    let obj = value.as_object().ok_or_else(|| TicketStoreError::MalformedPayload {
        message: "expected a JSON object for an issue payload".to_string(),
    })?;

    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| TicketStoreError::MalformedPayload {
            message: "issue payload missing `id`".to_string(),
        })?
        .to_string();

    let title = obj
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let status_raw = obj
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("open")
        .to_string();
    let issue_type_raw = obj
        .get("issue_type")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let assignee = obj
        .get("assignee")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let parent_id = obj
        .get("parent_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let labels: HashSet<String> = obj
        .get("labels")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let dependencies: Vec<Dependency> = obj
        .get("dependencies")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(parse_dependency).collect())
        .unwrap_or_default();

    Ok(Issue {
        id,
        title,
        description,
        status_raw,
        issue_type_raw,
        labels,
        assignee,
        parent_id,
        dependencies,
    })
}

fn parse_issue_list(stdout: &str) -> Result<Vec<Issue>, TicketStoreError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(stdout).map_err(|e| TicketStoreError::MalformedPayload {
            message: format!("invalid issue list JSON: {e}"),
        })?;
    values.into_iter().map(parse_issue).collect()
}

/// Real adapter shelling the `bd` binary.
pub struct BeadsTicketStore {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl BeadsTicketStore {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            binary: "bd".to_string(),
        }
    }

    pub fn with_binary(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TicketStoreError> {
        let output = self.executor.execute(&self.binary, args).await?;
        if !output.success() {
            return Err(TicketStoreError::CommandFailed {
                message: output.stderr,
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl TicketStore for BeadsTicketStore {
    async fn show(&self, id: &str) -> Result<Issue, TicketStoreError> {
        let stdout = self.run(&["show", id, "--json"]).await?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| TicketStoreError::MalformedPayload {
                message: format!("invalid `show` JSON for {id}: {e}"),
            })?;
        if value.is_null() {
            return Err(TicketStoreError::NotFound { id: id.to_string() });
        }
        parse_issue(value)
    }

    async fn list(&self, labels: &[&str]) -> Result<Vec<Issue>, TicketStoreError> {
        let mut args = vec!["list", "--json"];
        args.extend(field_to_args("--label", labels));
        let stdout = self.run(&args).await?;
        parse_issue_list(&stdout)
    }

    async fn ready(
        &self,
        parent: Option<&str>,
        labels: &[&str],
    ) -> Result<Vec<Issue>, TicketStoreError> {
        let mut args = vec!["ready", "--json"];
        if let Some(parent) = parent {
            args.push("--parent");
            args.push(parent);
        }
        args.extend(field_to_args("--label", labels));
        let stdout = self.run(&args).await?;
        parse_issue_list(&stdout)
    }

    async fn update_status(&self, id: &str, status: &str) -> Result<(), TicketStoreError> {
        self.run(&["update", id, "--status", status]).await?;
        Ok(())
    }

    async fn add_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError> {
        if labels.is_empty() {
            return Ok(());
        }
        let mut args = vec!["update", id];
        args.extend(field_to_args("--add-label", labels));
        self.run(&args).await?;
        Ok(())
    }

    async fn remove_labels(&self, id: &str, labels: &[&str]) -> Result<(), TicketStoreError> {
        if labels.is_empty() {
            return Ok(());
        }
        let mut args = vec!["update", id];
        args.extend(field_to_args("--remove-label", labels));
        self.run(&args).await?;
        Ok(())
    }

    async fn set_description(&self, id: &str, description: &str) -> Result<(), TicketStoreError> {
        self.run(&["update", id, "--description", description])
            .await?;
        Ok(())
    }

    async fn set_assignee(&self, id: &str, assignee: Option<&str>) -> Result<(), TicketStoreError> {
        let value = assignee.unwrap_or("");
        self.run(&["update", id, "--assignee", value]).await?;
        Ok(())
    }

    async fn create_message_bead(
        &self,
        parent: &str,
        title: &str,
        body: &str,
    ) -> Result<Issue, TicketStoreError> {
        let stdout = self
            .run(&[
                "create", "--type", "message", "--parent", parent, "--title", title, "--body",
                body, "--json",
            ])
            .await?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| TicketStoreError::MalformedPayload {
                message: format!("invalid create-message-bead JSON: {e}"),
            })?;
        parse_issue(value)
    }

    async fn set_agent_hook(
        &self,
        agent_id: &str,
        epic_id: Option<&str>,
    ) -> Result<(), TicketStoreError> {
        let value = epic_id.unwrap_or("");
        self.run(&["agent", "set-hook", agent_id, value]).await?;
        Ok(())
    }

    async fn get_agent_hook(&self, agent_id: &str) -> Result<Option<String>, TicketStoreError> {
        let stdout = self.run(&["agent", "get-hook", agent_id, "--json"]).await?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| TicketStoreError::MalformedPayload {
                message: format!("invalid get-hook JSON: {e}"),
            })?;
        Ok(value
            .get("hook_bead")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn list_descendant_changesets(&self, epic_id: &str) -> Result<Vec<Issue>, TicketStoreError> {
        let stdout = self
            .run(&["list-descendant-changesets", epic_id, "--json"])
            .await?;
        parse_issue_list(&stdout)
    }

    async fn list_all_changesets(&self) -> Result<Vec<Issue>, TicketStoreError> {
        let stdout = self.run(&["list-all-changesets", "--json"]).await?;
        parse_issue_list(&stdout)
    }

    async fn list_top_level_work_missing_epic_identity(
        &self,
    ) -> Result<Vec<Issue>, TicketStoreError> {
        let stdout = self
            .run(&["list-top-level-work-missing-epic-identity", "--json"])
            .await?;
        parse_issue_list(&stdout)
    }

    async fn prime(&self) -> Result<(), TicketStoreError> {
        self.run(&["prime"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::CommandOutput;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MockExecutor {
        responses: Mutex<HashMap<String, Result<CommandOutput, CommandError>>>,
    }

    impl MockExecutor {
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
    impl CommandExecutor for MockExecutor {
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

    #[tokio::test]
    async fn show_parses_issue_payload() {
        let mock = MockExecutor::new();
        mock.expect(
            "bd",
            &["show", "cs-1", "--json"],
            r#"{"id":"cs-1","title":"Fix thing","description":"changeset.work_branch: agent/cs-1","status":"open","issue_type":"task","labels":["at:changeset"],"assignee":"agent-1","parent_id":"epic-1","dependencies":[]}"#,
        )
        .await;

        let store = BeadsTicketStore::new(Arc::new(mock));
        let issue = store.show("cs-1").await.unwrap();
        assert_eq!(issue.id, "cs-1");
        assert!(issue.has_label("at:changeset"));
        assert_eq!(issue.assignee.as_deref(), Some("agent-1"));
    }

    #[tokio::test]
    async fn show_missing_returns_not_found() {
        let mock = MockExecutor::new();
        mock.expect("bd", &["show", "gone", "--json"], "null").await;

        let store = BeadsTicketStore::new(Arc::new(mock));
        let err = store.show("gone").await.unwrap_err();
        assert!(matches!(err, TicketStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_parses_multiple_issues() {
        let mock = MockExecutor::new();
        mock.expect(
            "bd",
            &["list", "--json", "--label", "at:epic"],
            r#"[{"id":"e1","title":"Epic","description":"","status":"open","issue_type":"epic","labels":["at:epic"],"assignee":null,"parent_id":null,"dependencies":[]}]"#,
        )
        .await;

        let store = BeadsTicketStore::new(Arc::new(mock));
        let issues = store.list(&["at:epic"]).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, "e1");
    }
}
