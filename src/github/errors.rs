//! Typed errors for the GitHub Adapter (§4.4).

use thiserror::Error;

use crate::external::command::CommandError;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("command execution error: {source}")]
    Command {
        #[from]
        source: CommandError,
    },
    #[error("gh CLI reported failure: {message}")]
    CommandFailed { message: String },
    #[error("malformed gh response: {message}")]
    MalformedResponse { message: String },
    #[error("ambiguous PR lookup: {head_branch} matched more than one open PR in {repo}")]
    AmbiguousPrLookup { repo: String, head_branch: String },
    #[error("timed out waiting on gh after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },
}

impl GitHubError {
    /// Transient-failure classification used by [`crate::github::retry`].
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::Timeout { .. } => true,
            GitHubError::CommandFailed { message } => {
                let lowered = message.to_ascii_lowercase();
                lowered.contains("rate limit")
                    || lowered.contains("timeout")
                    || lowered.contains("timed out")
                    || lowered.contains("connection reset")
                    || lowered.contains("502")
                    || lowered.contains("503")
                    || lowered.contains("504")
            }
            GitHubError::Command { .. } => true,
            _ => false,
        }
    }
}
