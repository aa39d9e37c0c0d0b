//! Low-level git primitives shelled against a specific repo root via `-C`
//! (§4.5). This module always operates on an explicit path so it can
//! target epic/changeset worktrees rather than the process's own cwd.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::external::command::{CommandError, CommandExecutor};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("command execution error: {source}")]
    Command {
        #[from]
        source: CommandError,
    },
    #[error("git command failed: {message}")]
    CommandFailed { message: String },
    #[error("non-fast-forward: {branch} could not be fast-forwarded to {target}")]
    NonFastForward { branch: String, target: String },
}

pub struct GitRepository {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl GitRepository {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            binary: "git".to_string(),
        }
    }

    pub fn with_binary(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    /// Run an arbitrary git subcommand against `repo_root`. Exposed for
    /// higher-level helpers (e.g. [`crate::git::integration`]) that need
    /// operations this type doesn't wrap individually.
    pub async fn run_raw(&self, repo_root: &Path, args: &[&str]) -> Result<String, GitError> {
        self.run(repo_root, args).await
    }

    async fn run(&self, repo_root: &Path, args: &[&str]) -> Result<String, GitError> {
        let root = repo_root.to_string_lossy().to_string();
        let mut full_args = vec!["-C", root.as_str()];
        full_args.extend_from_slice(args);
        let output = self.executor.execute(&self.binary, &full_args).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                message: output.stderr,
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn run_allow_failure(&self, repo_root: &Path, args: &[&str]) -> Result<bool, GitError> {
        match self.run(repo_root, args).await {
            Ok(_) => Ok(true),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn ref_exists(&self, repo_root: &Path, refname: &str) -> Result<bool, GitError> {
        self.run_allow_failure(repo_root, &["show-ref", "--verify", "--quiet", refname])
            .await
    }

    pub async fn current_branch(&self, repo_root: &Path) -> Result<String, GitError> {
        self.run(repo_root, &["branch", "--show-current"]).await
    }

    pub async fn is_clean(&self, repo_root: &Path) -> Result<bool, GitError> {
        let status = self.status_porcelain(repo_root).await?;
        Ok(status.is_empty())
    }

    pub async fn status_porcelain(&self, repo_root: &Path) -> Result<String, GitError> {
        self.run(repo_root, &["status", "--porcelain"]).await
    }

    pub async fn rev_parse(&self, repo_root: &Path, rev: &str) -> Result<String, GitError> {
        self.run(repo_root, &["rev-parse", rev]).await
    }

    pub async fn has_remote_branch(&self, repo_root: &Path, branch: &str) -> Result<bool, GitError> {
        self.ref_exists(repo_root, &format!("refs/remotes/origin/{branch}"))
            .await
    }

    pub async fn commits_ahead(&self, repo_root: &Path, branch: &str, base: &str) -> Result<u32, GitError> {
        let range = format!("{base}..{branch}");
        let output = self.run(repo_root, &["rev-list", "--count", &range]).await?;
        output.parse().map_err(|e| GitError::CommandFailed {
            message: format!("could not parse commit count `{output}`: {e}"),
        })
    }

    pub async fn diff_name_status(&self, repo_root: &Path, base: &str, head: &str) -> Result<Vec<(String, String)>, GitError> {
        let range = format!("{base}...{head}");
        let output = self
            .run(repo_root, &["diff", "--name-status", &range])
            .await?;
        Ok(output
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, char::is_whitespace);
                let status = parts.next()?.trim().to_string();
                let path = parts.next()?.trim().to_string();
                Some((status, path))
            })
            .collect())
    }

    pub async fn default_branch(&self, repo_root: &Path) -> Result<String, GitError> {
        let output = self
            .run(repo_root, &["symbolic-ref", "refs/remotes/origin/HEAD"])
            .await?;
        Ok(output
            .rsplit('/')
            .next()
            .unwrap_or("main")
            .to_string())
    }

    pub async fn commit_messages(&self, repo_root: &Path, range: &str) -> Result<Vec<String>, GitError> {
        let output = self
            .run(repo_root, &["log", "--format=%s", range])
            .await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    pub async fn fetch(&self, repo_root: &Path, remote: &str) -> Result<(), GitError> {
        self.run(repo_root, &["fetch", remote]).await?;
        Ok(())
    }

    pub async fn push(&self, repo_root: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(repo_root, &["push", remote, branch]).await?;
        Ok(())
    }

    pub async fn checkout(&self, repo_root: &Path, branch: &str) -> Result<(), GitError> {
        self.run(repo_root, &["checkout", branch]).await?;
        Ok(())
    }

    /// `ensure_local_branch(name)`: local exists → true; else create a
    /// tracking branch from the remote if it exists; else false.
    pub async fn ensure_local_branch(&self, repo_root: &Path, name: &str) -> Result<bool, GitError> {
        if self.ref_exists(repo_root, &format!("refs/heads/{name}")).await? {
            return Ok(true);
        }
        if self.has_remote_branch(repo_root, name).await? {
            self.run(
                repo_root,
                &["branch", "--track", name, &format!("origin/{name}")],
            )
            .await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Fast-forward a non-checked-out local ref to `origin/name`.
    pub async fn sync_local_branch_from_remote(&self, repo_root: &Path, name: &str) -> Result<(), GitError> {
        self.fetch(repo_root, "origin").await?;
        let remote_ref = format!("origin/{name}");
        let local_ref = format!("refs/heads/{name}");
        let ahead_of_local = self
            .run_allow_failure(
                repo_root,
                &["merge-base", "--is-ancestor", &local_ref, &remote_ref],
            )
            .await?;
        if !ahead_of_local {
            return Err(GitError::NonFastForward {
                branch: name.to_string(),
                target: remote_ref,
            });
        }
        self.run(
            repo_root,
            &["update-ref", &local_ref, &remote_ref],
        )
        .await?;
        Ok(())
    }

    pub async fn merge_base(&self, repo_root: &Path, a: &str, b: &str) -> Result<String, GitError> {
        self.run(repo_root, &["merge-base", a, b]).await
    }

    pub async fn is_ancestor(&self, repo_root: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        self.run_allow_failure(
            repo_root,
            &["merge-base", "--is-ancestor", ancestor, descendant],
        )
        .await
    }
}
