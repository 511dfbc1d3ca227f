//! Job error classification and retry decisions

use thiserror::Error;

use crate::domain::BackgroundJob;
use crate::error::PostrankError;

/// Failure of one job attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Will fail the same way on every attempt (bad params, missing config)
    #[error("{0}")]
    Permanent(String),

    /// May succeed on a later attempt
    #[error("{0}")]
    Transient(String),
}

impl JobError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::Permanent(_))
    }

    pub fn message(&self) -> &str {
        match self {
            JobError::Permanent(m) | JobError::Transient(m) => m,
        }
    }
}

impl From<PostrankError> for JobError {
    fn from(e: PostrankError) -> Self {
        if e.is_permanent() {
            JobError::Permanent(e.to_string())
        } else {
            JobError::Transient(e.to_string())
        }
    }
}

/// What to do with a job after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to pending with the new retry count
    Requeue { retry_count: u32, message: String },
    /// Terminal error
    Fail { message: String },
}

/// Cut `message` to at most `max` characters
pub fn truncate_error(message: &str, max: usize) -> String {
    message.chars().take(max).collect()
}

/// Apply the retry policy to a failed attempt of `job`.
///
/// Transient errors requeue while `retry_count < max_retries`; after that,
/// and for every permanent error, the job fails.
pub fn decide(job: &BackgroundJob, error: &JobError, max_error_length: usize) -> RetryDecision {
    match error {
        JobError::Permanent(message) => RetryDecision::Fail {
            message: truncate_error(message, max_error_length),
        },
        JobError::Transient(message) if job.retries_left() => RetryDecision::Requeue {
            retry_count: job.retry_count + 1,
            message: truncate_error(message, max_error_length),
        },
        JobError::Transient(message) => RetryDecision::Fail {
            message: truncate_error(
                &format!("{} (Failed after {} retries)", message, job.max_retries),
                max_error_length,
            ),
        },
    }
}
