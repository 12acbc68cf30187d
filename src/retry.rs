use crate::error::CompletionError;
use crate::schemas::completion_response::CompletionResponse;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::Retry;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Bounded retry policy for completion calls.
///
/// The delay doubles after every failed attempt and is capped at
/// `max_delay`; the cap is independent of `max_attempts`. No jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Responses with fewer characters than this count as failures.
    pub min_response_chars: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            min_response_chars: 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_min_response_chars(mut self, min_response_chars: usize) -> Self {
        self.min_response_chars = min_response_chars;
        self
    }

    /// Number of calls the policy makes at most; never zero.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            current: self.base_delay,
            max_delay: self.max_delay,
        }
    }

    /// The sleeps between consecutive attempts: one fewer than the budget.
    pub fn delays(&self) -> std::iter::Take<Backoff> {
        self.backoff().take(self.attempt_budget() as usize - 1)
    }

    /// Trims the content; blank or too-short content is a failure.
    fn accept(&self, content: String) -> Result<String, CompletionError> {
        let required = self.min_response_chars.max(1);
        let trimmed = content.trim();
        let chars = trimmed.chars().count();
        if chars == 0 {
            Err(CompletionError::EmptyContent)
        } else if chars < required {
            Err(CompletionError::ShortContent { chars, required })
        } else {
            Ok(trimmed.to_string())
        }
    }
}

/// Doubling delay sequence capped at a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max_delay: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current.min(self.max_delay);
        self.current = self.current.saturating_mul(2);
        Some(delay)
    }
}

/// Runs `call` until it yields acceptable content or the attempt budget is
/// spent, sleeping the backoff delay between attempts.
///
/// Every failure is retryable. Exhaustion is returned as a response without
/// content, never as an error.
pub async fn execute_with_retries<F, Fut>(policy: &RetryPolicy, mut call: F) -> CompletionResponse
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, CompletionError>>,
{
    let budget = policy.attempt_budget();
    let attempt = AtomicU32::new(0);

    let result = Retry::start(policy.delays(), || {
        let current_attempt = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = call();
        async move {
            tracing::debug!("completion attempt {}/{}", current_attempt, budget);
            match pending.await.and_then(|content| policy.accept(content)) {
                Ok(content) => Ok(content),
                Err(e) => {
                    tracing::warn!(
                        "completion attempt {}/{} failed: {} - {}",
                        current_attempt,
                        budget,
                        e.kind(),
                        e
                    );
                    Err(e)
                }
            }
        }
    })
    .await;

    let attempts = attempt.load(Ordering::SeqCst);
    match result {
        Ok(content) => {
            tracing::info!("completion received after {} attempt(s)", attempts);
            CompletionResponse::completed(content, attempts)
        }
        Err(e) => {
            tracing::error!(
                "completion failed after {} attempts. Final error: {}",
                attempts,
                e
            );
            CompletionResponse::exhausted(attempts)
        }
    }
}
