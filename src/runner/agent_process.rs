//! Agent process launch (§4.10 step 11 / §6 "Agent process"): spawns the
//! coding-agent subprocess for one changeset and waits for it to exit.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::external::command::CommandError;

#[derive(Debug, Clone)]
pub struct AgentProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct AgentProcessOutcome {
    pub status_code: i32,
}

impl AgentProcessOutcome {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

/// Abstraction over launching the agent subprocess, mirroring
/// [`crate::external::command::CommandExecutor`] but with `cwd`/`env`
/// support `CommandExecutor` doesn't need for `git`/`bd`/`gh` calls.
#[async_trait]
pub trait AgentProcessRunner: Send + Sync {
    async fn run_agent(&self, spec: &AgentProcessSpec) -> Result<AgentProcessOutcome, CommandError>;
}

pub struct TokioAgentProcessRunner;

#[async_trait]
impl AgentProcessRunner for TokioAgentProcessRunner {
    async fn run_agent(&self, spec: &AgentProcessSpec) -> Result<AgentProcessOutcome, CommandError> {
        let mut command = tokio::process::Command::new(&spec.program);
        command.args(&spec.args).current_dir(&spec.cwd);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let status = command.status().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CommandError::CommandNotFound {
                    command: spec.program.clone(),
                }
            } else {
                CommandError::Io { message: e.to_string() }
            }
        })?;

        Ok(AgentProcessOutcome {
            status_code: status.code().unwrap_or(-1),
        })
    }
}

/// Build the argv/env for running the agent against one changeset, per §6.
pub fn build_agent_spec(
    agent_command: &[String],
    repo_root: &PathBuf,
    beads_root: &PathBuf,
    agent_id: &str,
    epic_id: &str,
    changeset_id: &str,
) -> Option<AgentProcessSpec> {
    let (program, args) = agent_command.split_first()?;
    Some(AgentProcessSpec {
        program: program.clone(),
        args: args.to_vec(),
        cwd: repo_root.clone(),
        env: vec![
            ("ATELIER_AGENT_ID".to_string(), agent_id.to_string()),
            ("BD_ACTOR".to_string(), agent_id.to_string()),
            ("BEADS_AGENT_NAME".to_string(), agent_id.to_string()),
            ("BEADS_DIR".to_string(), beads_root.display().to_string()),
            ("BEADS_DB".to_string(), beads_root.join("beads.db").display().to_string()),
            ("ATELIER_EPIC_ID".to_string(), epic_id.to_string()),
            ("ATELIER_CHANGESET_ID".to_string(), changeset_id.to_string()),
        ],
    })
}
