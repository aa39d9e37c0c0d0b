//! Linear-backoff retry wrapper around transient `gh` failures (§4.4).

use std::time::Duration;

use tracing::{debug, warn};

use super::errors::GitHubError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
pub struct GitHubRetryHandler {
    config: RetryConfig,
}

impl GitHubRetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` up to `max_attempts` times with linear backoff,
    /// retrying only errors classified transient by [`GitHubError::is_transient`].
    pub async fn execute_with_retry<F, Fut, R>(&self, mut operation: F) -> Result<R, GitHubError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<R, GitHubError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "gh operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_transient() {
                        return Err(error);
                    }
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.config.max_attempts,
                        error = %error,
                        "gh operation failed, retrying"
                    );
                    last_error = Some(error);
                    if attempt + 1 < self.config.max_attempts {
                        tokio::time::sleep(self.config.base_delay * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(GitHubError::CommandFailed {
            message: "retry exhausted with no recorded error".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let handler = GitHubRetryHandler::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        });
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<&str, GitHubError> = handler
            .execute_with_retry(move || {
                let attempts = attempts_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GitHubError::CommandFailed {
                            message: "503 service unavailable".to_string(),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failure_does_not_retry() {
        let handler = GitHubRetryHandler::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), GitHubError> = handler
            .execute_with_retry(move || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(GitHubError::MalformedResponse {
                        message: "bad json".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
