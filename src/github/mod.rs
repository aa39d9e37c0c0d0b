//! GitHub Adapter (§4.4 / §2.4): typed, cached, retrying PR lookups backed
//! by the `gh` CLI.

pub mod errors;
pub mod retry;
pub mod types;

pub use errors::GitHubError;
pub use retry::{GitHubRetryHandler, RetryConfig};
pub use types::{
    default_branch_has_merge_conflict, lifecycle_state, MergeConflictState, PrComment, PrPayload,
    PrLookupOutcome, PrReview,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;

use crate::external::command::CommandExecutor;
use crate::ticket::ReviewLifecycle;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    repo: String,
    head_branch: String,
}

/// Typed, cached, retrying GitHub PR client, grounded on shelling `gh`
/// through [`CommandExecutor`] rather than a typed HTTP client.
pub struct GitHubAdapter {
    executor: Arc<dyn CommandExecutor>,
    retry: GitHubRetryHandler,
    cache: Cache<CacheKey, Arc<PrLookupOutcome>>,
    timeout: Duration,
}

const PR_VIEW_FIELDS: &str = "number,url,state,baseRefName,headRefName,title,body,labels,isDraft,mergedAt,closedAt,updatedAt,reviewDecision,mergeable,mergeStateStatus,reviewRequests,comments,reviews";

impl GitHubAdapter {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            retry: GitHubRetryHandler::default(),
            cache: Cache::builder()
                .max_capacity(4096)
                .time_to_live(Duration::from_secs(300))
                .build(),
            timeout: Duration::from_secs(20),
        }
    }

    /// Drop all cached lookups. Called at worker-cycle/process start (§5).
    pub async fn clear_runtime_cache(&self) {
        self.cache.invalidate_all();
    }

    async fn gh(&self, args: &[&str]) -> Result<String, GitHubError> {
        let output = self.executor.execute("gh", args).await?;
        if !output.success() {
            return Err(GitHubError::CommandFailed {
                message: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// `lookup_github_pr_status(repo, head_branch)` — §4.4.
    pub async fn lookup_github_pr_status(
        &self,
        repo: &str,
        head_branch: &str,
    ) -> PrLookupOutcome {
        let key = CacheKey {
            repo: repo.to_string(),
            head_branch: head_branch.to_string(),
        };
        if let Some(cached) = self.cache.get(&key).await {
            return (*cached).clone();
        }

        let outcome = self.fetch_pr_status(repo, head_branch).await;
        self.cache.insert(key, Arc::new(outcome.clone())).await;
        outcome
    }

    async fn fetch_pr_status(&self, repo: &str, head_branch: &str) -> PrLookupOutcome {
        let result = self
            .retry
            .execute_with_retry(|| self.list_prs_for_branch(repo, head_branch))
            .await;

        let mut candidates = match result {
            Ok(candidates) => candidates,
            Err(error) => return PrLookupOutcome::Error(error.to_string()),
        };

        if candidates.is_empty() {
            return PrLookupOutcome::NotFound;
        }

        let open: Vec<_> = candidates
            .iter()
            .filter(|c| c.0.eq_ignore_ascii_case("OPEN"))
            .collect();
        if open.len() > 1 {
            return PrLookupOutcome::Error(
                GitHubError::AmbiguousPrLookup {
                    repo: repo.to_string(),
                    head_branch: head_branch.to_string(),
                }
                .to_string(),
            );
        }

        let chosen_number = if open.len() == 1 {
            open[0].1
        } else {
            // Only closed/merged PRs exist; select the most-recently-updated.
            candidates.sort_by(|a, b| b.2.cmp(&a.2));
            candidates[0].1
        };

        match self.view_pr(repo, chosen_number).await {
            Ok(payload) => PrLookupOutcome::Found(Box::new(payload)),
            Err(error) => PrLookupOutcome::Error(error.to_string()),
        }
    }

    /// Returns `(state, number, updated_at)` triples for every PR on the branch.
    async fn list_prs_for_branch(
        &self,
        repo: &str,
        head_branch: &str,
    ) -> Result<Vec<(String, u64, DateTime<Utc>)>, GitHubError> {
        let stdout = self
            .gh(&[
                "pr",
                "list",
                "--repo",
                repo,
                "--head",
                head_branch,
                "--state",
                "all",
                "--json",
                "number,state,updatedAt,closedAt,mergedAt",
            ])
            .await?;

        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&stdout).map_err(|e| GitHubError::MalformedResponse {
                message: format!("invalid `pr list` JSON: {e}"),
            })?;

        rows.into_iter()
            .map(|row| {
                let state = row
                    .get("state")
                    .and_then(|v| v.as_str())
                    .unwrap_or("OPEN")
                    .to_string();
                let number = row
                    .get("number")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| GitHubError::MalformedResponse {
                        message: "`pr list` row missing `number`".to_string(),
                    })?;
                let updated_at = row
                    .get("updatedAt")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                Ok((state, number, updated_at))
            })
            .collect()
    }

    async fn view_pr(&self, repo: &str, number: u64) -> Result<PrPayload, GitHubError> {
        let number_str = number.to_string();
        let stdout = self
            .retry
            .execute_with_retry(|| {
                self.gh(&["pr", "view", &number_str, "--repo", repo, "--json", PR_VIEW_FIELDS])
            })
            .await?;
        serde_json::from_str(&stdout).map_err(|e| GitHubError::MalformedResponse {
            message: format!("invalid `pr view` JSON for #{number}: {e}"),
        })
    }

    /// `pr create --repo R --base B --head H --title T --body-file F [--draft]`.
    pub async fn create_pr(
        &self,
        repo: &str,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<PrPayload, GitHubError> {
        let mut args = vec!["pr", "create", "--repo", repo, "--base", base, "--head", head, "--title", title, "--body", body];
        if draft {
            args.push("--draft");
        }
        let stdout = self.gh(&args).await?;
        let url = stdout.trim();
        let number = url
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| GitHubError::MalformedResponse {
                message: format!("could not parse PR number from `pr create` output: {url}"),
            })?;
        self.view_pr(repo, number).await
    }

    /// `gh pr edit NUMBER --repo R --base BASE`.
    pub async fn retarget_pr_base(&self, repo: &str, number: u64, base: &str) -> Result<(), GitHubError> {
        let number_str = number.to_string();
        self.gh(&["pr", "edit", &number_str, "--repo", repo, "--base", base])
            .await?;
        Ok(())
    }

    pub fn has_review_requests(payload: &PrPayload) -> bool {
        !payload.review_requests.is_empty()
    }

    /// Latest non-bot feedback timestamp from comments and
    /// COMMENTED/CHANGES_REQUESTED reviews.
    pub fn latest_feedback_timestamp(payload: &PrPayload) -> Option<DateTime<Utc>> {
        let comment_times = payload
            .comments
            .iter()
            .filter(|c| !c.author.is_bot_author())
            .map(|c| c.created_at);
        let review_times = payload
            .reviews
            .iter()
            .filter(|r| !r.author.is_bot_author())
            .filter(|r| matches!(r.state.as_str(), "COMMENTED" | "CHANGES_REQUESTED"))
            .filter_map(|r| r.submitted_at);
        comment_times.chain(review_times).max()
    }

    /// As above, merged with inline review-thread comment timestamps.
    pub fn latest_feedback_timestamp_with_inline_comments(
        payload: &PrPayload,
        inline_comment_times: &[DateTime<Utc>],
    ) -> Option<DateTime<Utc>> {
        let base = Self::latest_feedback_timestamp(payload);
        let inline_max = inline_comment_times.iter().copied().max();
        match (base, inline_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        }
    }

    /// Paginates `reviewThreads` via GraphQL and counts unresolved threads.
    pub async fn unresolved_review_thread_count(
        &self,
        owner: &str,
        name: &str,
        pr_number: u64,
    ) -> Result<u32, GitHubError> {
        let mut unresolved = 0;
        let mut after: Option<String> = None;

        loop {
            let after_clause = after
                .as_deref()
                .map(|cursor| format!(", after: \"{cursor}\""))
                .unwrap_or_default();
            let query = format!(
                "query {{ repository(owner: \"{owner}\", name: \"{name}\") {{ pullRequest(number: {pr_number}) {{ reviewThreads(first: 100{after_clause}) {{ pageInfo {{ hasNextPage endCursor }} nodes {{ isResolved }} }} }} }} }}"
            );
            let stdout = self.gh(&["api", "graphql", "-f", &format!("query={query}")]).await?;
            let value: serde_json::Value =
                serde_json::from_str(&stdout).map_err(|e| GitHubError::MalformedResponse {
                    message: format!("invalid reviewThreads GraphQL JSON: {e}"),
                })?;
            let threads = &value["data"]["repository"]["pullRequest"]["reviewThreads"];
            let nodes = threads["nodes"].as_array().cloned().unwrap_or_default();
            for node in &nodes {
                if !node["isResolved"].as_bool().unwrap_or(true) {
                    unresolved += 1;
                }
            }
            let has_next = threads["pageInfo"]["hasNextPage"].as_bool().unwrap_or(false);
            if !has_next {
                break;
            }
            after = threads["pageInfo"]["endCursor"].as_str().map(str::to_string);
            if after.is_none() {
                break;
            }
        }

        Ok(unresolved)
    }

    pub fn default_branch_has_merge_conflict(payload: &PrPayload) -> MergeConflictState {
        default_branch_has_merge_conflict(payload)
    }

    pub fn lifecycle_state(
        payload: Option<&PrPayload>,
        pushed: bool,
        review_requested: bool,
    ) -> Option<ReviewLifecycle> {
        lifecycle_state(payload, pushed, review_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::{CommandError, CommandOutput};
    use async_trait::async_trait;
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

        async fn expect(&self, args: &[&str], stdout: &str) {
            let key = format!("gh {}", args.join(" "));
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
    async fn not_found_when_no_prs() {
        let mock = MockExecutor::new();
        mock.expect(
            &["pr", "list", "--repo", "o/r", "--head", "agent/cs-1", "--state", "all", "--json", "number,state,updatedAt,closedAt,mergedAt"],
            "[]",
        )
        .await;

        let adapter = GitHubAdapter::new(Arc::new(mock));
        let outcome = adapter.lookup_github_pr_status("o/r", "agent/cs-1").await;
        assert!(matches!(outcome, PrLookupOutcome::NotFound));
    }

    #[tokio::test]
    async fn ambiguous_when_two_open_prs() {
        let mock = MockExecutor::new();
        mock.expect(
            &["pr", "list", "--repo", "o/r", "--head", "agent/cs-1", "--state", "all", "--json", "number,state,updatedAt,closedAt,mergedAt"],
            r#"[{"number":1,"state":"OPEN","updatedAt":"2026-01-01T00:00:00Z"},{"number":2,"state":"OPEN","updatedAt":"2026-01-02T00:00:00Z"}]"#,
        )
        .await;

        let adapter = GitHubAdapter::new(Arc::new(mock));
        let outcome = adapter.lookup_github_pr_status("o/r", "agent/cs-1").await;
        match outcome {
            PrLookupOutcome::Error(message) => assert!(message.contains("ambiguous")),
            other => panic!("expected ambiguous error, got {other:?}"),
        }
    }

    #[test]
    fn has_review_requests_checks_non_empty() {
        let payload = super::types::PrPayload {
            number: 1,
            url: "u".into(),
            state: "OPEN".into(),
            base_ref_name: "main".into(),
            head_ref_name: "h".into(),
            title: String::new(),
            body: String::new(),
            is_draft: false,
            merged_at: None,
            closed_at: None,
            updated_at: None,
            review_decision: None,
            mergeable: None,
            merge_state_status: None,
            review_requests: vec![],
            comments: vec![],
            reviews: vec![],
        };
        assert!(!GitHubAdapter::has_review_requests(&payload));
    }
}
