//! Exponential backoff for model API calls

use std::time::Duration;

use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};

/// Bounded exponential backoff for retryable API errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Retry without waiting (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): min * 2^(attempt-1), capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Send `request`, retrying retryable errors per `policy`
pub async fn complete_with_backoff(
    client: &dyn LlmClient,
    request: &CompletionRequest,
    policy: &BackoffPolicy,
) -> Result<CompletionResponse, LlmError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match client.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let mut delay = policy.delay_for_attempt(attempt);
                if let LlmError::RateLimited { retry_after } = &e {
                    delay = delay.max((*retry_after).min(policy.max_delay));
                }
                log::warn!(
                    "Model call failed (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    attempts,
                    e,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
