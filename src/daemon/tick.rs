//! Poll loop configuration and per-worker counters

use std::time::Duration;

use crate::domain::JobType;

/// Configuration for the job worker poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Job types this worker claims
    pub job_types: Vec<JobType>,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Score rows per recompute page
    pub recompute_batch_size: usize,
    /// Check for cancellation every N batches
    pub cancel_check_interval: usize,
    /// Persist progress every N batches (and always on the last one)
    pub progress_interval: usize,
    /// Posts per backfill page
    pub backfill_batch_size: usize,
    pub heartbeat_interval: Duration,
    /// Longest error message stored on a job row
    pub max_error_length: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            job_types: vec![JobType::RecomputeFinalScores],
            poll_interval: Duration::from_secs(30),
            recompute_batch_size: 500,
            cancel_check_interval: 5,
            progress_interval: 5,
            backfill_batch_size: 20,
            heartbeat_interval: Duration::from_secs(60),
            max_error_length: 1000,
        }
    }
}

impl PollConfig {
    /// Create a poll config for the given job types and interval
    pub fn new(job_types: Vec<JobType>, poll_interval: Duration) -> Self {
        Self {
            job_types,
            poll_interval,
            ..Default::default()
        }
    }

    /// Set the recompute page size
    pub fn with_recompute_batch_size(mut self, size: usize) -> Self {
        self.recompute_batch_size = size;
        self
    }

    /// Set the backfill page size
    pub fn with_backfill_batch_size(mut self, size: usize) -> Self {
        self.backfill_batch_size = size;
        self
    }

    /// Whether batch `batch_index` (0-based) is a cancellation checkpoint
    pub fn is_cancel_checkpoint(&self, batch_index: usize) -> bool {
        batch_index % self.cancel_check_interval.max(1) == 0
    }

    /// Whether progress should be written after batch `batch_index`
    pub fn is_progress_checkpoint(&self, batch_index: usize, is_last: bool) -> bool {
        is_last || batch_index % self.progress_interval.max(1) == 0
    }
}

/// How one claimed job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    /// Transient failure, back to pending
    Retried { retry_count: u32 },
    Failed { message: String },
}

impl JobOutcome {
    /// Whether the worker sleeps one poll interval before its next claim.
    /// A requeued job keeps its `created_at`, so it is usually next in line.
    pub fn needs_cool_down(&self) -> bool {
        matches!(self, JobOutcome::Cancelled | JobOutcome::Retried { .. })
    }
}

/// Counters kept by a worker for its own lifetime
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one poll of the queue
    pub fn poll(&mut self) {
        self.polls += 1;
    }

    /// Record how a job ended
    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
            JobOutcome::Retried { .. } => self.retried += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Jobs that reached any outcome
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.retried + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_config_default() {
        let config = PollConfig::default();
        assert_eq!(config.job_types, vec![JobType::RecomputeFinalScores]);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.recompute_batch_size, 500);
        assert_eq!(config.cancel_check_interval, 5);
        assert_eq!(config.backfill_batch_size, 20);
        assert_eq!(config.max_error_length, 1000);
    }

    #[test]
    fn test_poll_config_builders() {
        let config = PollConfig::new(vec![JobType::RunScraper], Duration::from_secs(1))
            .with_recompute_batch_size(2)
            .with_backfill_batch_size(3);
        assert_eq!(config.job_types, vec![JobType::RunScraper]);
        assert_eq!(config.recompute_batch_size, 2);
        assert_eq!(config.backfill_batch_size, 3);
    }

    #[test]
    fn test_checkpoints() {
        let config = PollConfig::default();
        let cancel: Vec<usize> = (0..12).filter(|i| config.is_cancel_checkpoint(*i)).collect();
        assert_eq!(cancel, vec![0, 5, 10]);

        assert!(config.is_progress_checkpoint(0, false));
        assert!(!config.is_progress_checkpoint(3, false));
        assert!(config.is_progress_checkpoint(3, true));
    }

    #[test]
    fn test_zero_interval_checks_every_batch() {
        let config = PollConfig {
            cancel_check_interval: 0,
            ..Default::default()
        };
        assert!(config.is_cancel_checkpoint(1));
        assert!(config.is_cancel_checkpoint(7));
    }

    #[test]
    fn test_cool_down_after_cancel_and_retry() {
        assert!(JobOutcome::Cancelled.needs_cool_down());
        assert!(JobOutcome::Retried { retry_count: 1 }.needs_cool_down());
        assert!(!JobOutcome::Completed.needs_cool_down());
        assert!(
            !JobOutcome::Failed {
                message: "boom".to_string()
            }
            .needs_cool_down()
        );
    }

    #[test]
    fn test_worker_stats_record() {
        let mut stats = WorkerStats::new();
        stats.poll();
        stats.poll();
        stats.record(&JobOutcome::Completed);
        stats.record(&JobOutcome::Retried { retry_count: 1 });
        stats.record(&JobOutcome::Failed {
            message: "boom".to_string(),
        });
        stats.record(&JobOutcome::Cancelled);

        assert_eq!(stats.polls, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.processed(), 4);
    }
}
