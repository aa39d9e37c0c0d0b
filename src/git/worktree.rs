//! WorktreeMapping (§3) and `cleanup_epic_branches_and_worktrees` (§4.5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external::command::CommandExecutor;

use super::repository::{GitError, GitRepository};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed worktree mapping: {message}")]
    Malformed { message: String },
}

/// One worktree-mapping file per epic, owned by the project data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeMapping {
    pub epic_id: String,
    pub worktree_path: PathBuf,
    pub root_branch: String,
    #[serde(default)]
    pub changesets: HashMap<String, String>,
    #[serde(default)]
    pub changeset_worktrees: HashMap<String, PathBuf>,
}

impl WorktreeMapping {
    pub fn new(epic_id: impl Into<String>, worktree_path: PathBuf, root_branch: impl Into<String>) -> Self {
        Self {
            epic_id: epic_id.into(),
            worktree_path,
            root_branch: root_branch.into(),
            changesets: HashMap::new(),
            changeset_worktrees: HashMap::new(),
        }
    }

    pub fn mapping_path(data_dir: &Path, epic_id: &str) -> PathBuf {
        data_dir.join(format!("{epic_id}.worktree-mapping.json"))
    }

    pub async fn load(data_dir: &Path, epic_id: &str) -> Result<Option<Self>, WorktreeError> {
        let path = Self::mapping_path(data_dir, epic_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let mapping = serde_json::from_str(&contents).map_err(|e| WorktreeError::Malformed {
                    message: format!("invalid worktree mapping JSON at {}: {e}", path.display()),
                })?;
                Ok(Some(mapping))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorktreeError::Io { path, source: e }),
        }
    }

    pub async fn save(&self, data_dir: &Path) -> Result<(), WorktreeError> {
        let path = Self::mapping_path(data_dir, &self.epic_id);
        let contents = serde_json::to_string_pretty(self).map_err(|e| WorktreeError::Malformed {
            message: format!("could not serialize worktree mapping: {e}"),
        })?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| WorktreeError::Io { path, source: e })
    }
}

pub struct WorktreeManager {
    git: Arc<GitRepository>,
}

impl WorktreeManager {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            git: Arc::new(GitRepository::new(executor)),
        }
    }

    pub fn from_repository(git: Arc<GitRepository>) -> Self {
        Self { git }
    }

    /// Remove mapped worktrees and local refs not present in `keep_branches`.
    pub async fn cleanup_epic_branches_and_worktrees(
        &self,
        repo_root: &Path,
        mapping: &WorktreeMapping,
        keep_branches: &[String],
    ) -> Result<Vec<String>, WorktreeError> {
        let mut removed = Vec::new();

        for (changeset_id, worktree_path) in &mapping.changeset_worktrees {
            let branch = mapping.changesets.get(changeset_id);
            let keep = branch
                .map(|b| keep_branches.iter().any(|k| k == b))
                .unwrap_or(false);
            if keep {
                continue;
            }

            self.git
                .run_raw(
                    repo_root,
                    &["worktree", "remove", "--force", &worktree_path.to_string_lossy()],
                )
                .await
                .ok();

            if let Some(branch) = branch {
                self.git
                    .run_raw(repo_root, &["branch", "-D", branch])
                    .await
                    .ok();
                removed.push(branch.clone());
            }
        }

        Ok(removed)
    }

    pub async fn add_worktree(
        &self,
        repo_root: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.git
            .run_raw(
                repo_root,
                &["worktree", "add", &worktree_path.to_string_lossy(), branch],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let mut mapping = WorktreeMapping::new(
            "epic-1",
            dir.path().join("epic-1"),
            "agent/epic-1-root",
        );
        mapping
            .changesets
            .insert("cs-1".to_string(), "agent/cs-1".to_string());
        mapping.save(dir.path()).await.unwrap();

        let loaded = WorktreeMapping::load(dir.path(), "epic-1").await.unwrap().unwrap();
        assert_eq!(loaded.root_branch, "agent/epic-1-root");
        assert_eq!(loaded.changesets.get("cs-1").unwrap(), "agent/cs-1");
    }

    #[tokio::test]
    async fn load_missing_mapping_returns_none() {
        let dir = tempdir().unwrap();
        let loaded = WorktreeMapping::load(dir.path(), "no-such-epic").await.unwrap();
        assert!(loaded.is_none());
    }
}
