//! `integrate_epic_root_to_parent` and its three history modes (§4.5).

use std::path::Path;

use super::repository::{GitError, GitRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    Manual,
    Rebase,
    Squash,
}

impl HistoryMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "rebase" => Some(Self::Rebase),
            "squash" => Some(Self::Squash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationOutcome {
    pub ok: bool,
    pub integrated_sha: Option<String>,
    pub error: Option<String>,
}

/// Deterministic squash-commit subject fallback: `ticket_id: title (epic_id)`.
pub fn squash_message_fallback(ticket_id: &str, title: &str, epic_id: &str) -> String {
    format!("{ticket_id}: {title} ({epic_id})")
}

/// Bring `parent` up to date with `root` according to `history`, in
/// `repo_root` (the caller picks the epic worktree when it has `root`
/// checked out, else the main repo root).
pub async fn integrate_epic_root_to_parent(
    git: &GitRepository,
    repo_root: &Path,
    root: &str,
    parent: &str,
    history: HistoryMode,
    squash_message: Option<String>,
) -> IntegrationOutcome {
    if let Err(e) = git.fetch(repo_root, "origin").await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(format!("fetch failed: {e}")),
        };
    }

    match history {
        HistoryMode::Manual => integrate_manual(git, repo_root, root, parent).await,
        HistoryMode::Rebase => integrate_rebase(git, repo_root, root, parent).await,
        HistoryMode::Squash => {
            integrate_squash(git, repo_root, root, parent, squash_message).await
        }
    }
}

async fn integrate_manual(
    git: &GitRepository,
    repo_root: &Path,
    root: &str,
    parent: &str,
) -> IntegrationOutcome {
    let is_ff = match git.is_ancestor(repo_root, parent, root).await {
        Ok(v) => v,
        Err(e) => {
            return IntegrationOutcome {
                ok: false,
                integrated_sha: None,
                error: Some(e.to_string()),
            }
        }
    };
    if !is_ff {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(format!("{parent} is not a fast-forward ancestor target for {root}")),
        };
    }
    if let Err(e) = git.checkout(repo_root, parent).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        };
    }
    ff_merge(git, repo_root, root, parent).await
}

async fn ff_merge(
    git: &GitRepository,
    repo_root: &Path,
    root: &str,
    parent: &str,
) -> IntegrationOutcome {
    let _ = parent;
    match git.run_raw(repo_root, &["merge", "--ff-only", root]).await {
        Ok(_) => match git.rev_parse(repo_root, "HEAD").await {
            Ok(sha) => IntegrationOutcome {
                ok: true,
                integrated_sha: Some(sha),
                error: None,
            },
            Err(e) => IntegrationOutcome {
                ok: false,
                integrated_sha: None,
                error: Some(e.to_string()),
            },
        },
        Err(e) => IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        },
    }
}

async fn integrate_rebase(
    git: &GitRepository,
    repo_root: &Path,
    root: &str,
    parent: &str,
) -> IntegrationOutcome {
    if let Err(e) = git.checkout(repo_root, root).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        };
    }
    if let Err(e) = git.run_raw(repo_root, &["rebase", parent]).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(format!("rebase of {root} onto {parent} failed: {e}")),
        };
    }
    if let Err(e) = git.checkout(repo_root, parent).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        };
    }
    ff_merge(git, repo_root, root, parent).await
}

async fn integrate_squash(
    git: &GitRepository,
    repo_root: &Path,
    root: &str,
    parent: &str,
    squash_message: Option<String>,
) -> IntegrationOutcome {
    let message = squash_message.unwrap_or_else(|| format!("squash {root} into {parent}"));
    if let Err(e) = git.checkout(repo_root, parent).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        };
    }
    if let Err(e) = git.run_raw(repo_root, &["merge", "--squash", root]).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(format!("squash merge of {root} into {parent} failed: {e}")),
        };
    }
    if let Err(e) = git.run_raw(repo_root, &["commit", "-m", &message]).await {
        return IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        };
    }
    match git.rev_parse(repo_root, "HEAD").await {
        Ok(sha) => IntegrationOutcome {
            ok: true,
            integrated_sha: Some(sha),
            error: None,
        },
        Err(e) => IntegrationOutcome {
            ok: false,
            integrated_sha: None,
            error: Some(e.to_string()),
        },
    }
}

pub use GitError as IntegrationError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_mode_parses_known_values() {
        assert_eq!(HistoryMode::parse("squash"), Some(HistoryMode::Squash));
        assert_eq!(HistoryMode::parse("REBASE"), Some(HistoryMode::Rebase));
        assert_eq!(HistoryMode::parse("bogus"), None);
    }

    #[test]
    fn squash_fallback_is_deterministic() {
        let a = squash_message_fallback("cs-1", "Fix thing", "epic-1");
        let b = squash_message_fallback("cs-1", "Fix thing", "epic-1");
        assert_eq!(a, b);
        assert_eq!(a, "cs-1: Fix thing (epic-1)");
    }
}
