//! Git Integration Helper (§4.5 / §2.5).

pub mod integration;
pub mod repository;
pub mod worktree;

pub use integration::{integrate_epic_root_to_parent, squash_message_fallback, HistoryMode, IntegrationOutcome};
pub use repository::{GitError, GitRepository};
pub use worktree::{WorktreeManager, WorktreeMapping};
