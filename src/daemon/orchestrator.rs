//! Job orchestrator
//!
//! A sequential poll loop: claim the oldest pending job of the configured
//! types, dispatch it to its handler, then record the outcome. All failure
//! handling for a job happens in [`Orchestrator::process_job`].

use std::sync::Arc;

use tokio::sync::watch;

use crate::daemon::cancel::StoreCancellation;
use crate::daemon::handlers::{
    self, DelegationConfig, ExternalRunner, HandlerOutcome, ProcessRunner,
};
use crate::daemon::heartbeat;
use crate::daemon::retry::{JobError, RetryDecision, decide};
use crate::daemon::tick::{JobOutcome, PollConfig, WorkerStats};
use crate::domain::{BackgroundJob, JobParams, JobStatus};
use crate::error::Result;
use crate::scoring::LlmScorer;
use crate::store::JobStore;

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    scorer: Option<Arc<LlmScorer>>,
    runner: Arc<dyn ExternalRunner>,
    delegation: DelegationConfig,
    config: PollConfig,
    stats: WorkerStats,
}

impl Orchestrator {
    /// Create an orchestrator that runs delegated jobs as child processes
    pub fn new(store: Arc<dyn JobStore>, config: PollConfig, delegation: DelegationConfig) -> Self {
        Self {
            store,
            scorer: None,
            runner: Arc::new(ProcessRunner),
            delegation,
            config,
            stats: WorkerStats::new(),
        }
    }

    /// Scorer used by backfill jobs
    pub fn with_scorer(mut self, scorer: Arc<LlmScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Replace the subprocess runner for delegated jobs
    pub fn with_runner(mut self, runner: Arc<dyn ExternalRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested, finishing current job");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                    // hold the sender so the poll sleep is not cut short
                    std::future::pending::<()>().await;
                    drop(shutdown_tx);
                }
            }
        });

        let result = self.run_until(shutdown_rx).await;
        signal.abort();
        result
    }

    /// Poll until `shutdown` becomes true. A running job is always finished
    /// before the flag is observed.
    pub async fn run_until(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            job_types = ?self.config.job_types,
            poll_interval = ?self.config.poll_interval,
            "Worker started"
        );
        let heartbeat = heartbeat::spawn(self.config.heartbeat_interval);

        while !*shutdown.borrow() {
            self.stats.poll();
            let wait = match self.store.claim_next_job(&self.config.job_types) {
                Ok(Some(job)) => self.process_job(job).await.needs_cool_down(),
                Ok(None) => {
                    tracing::debug!("No pending jobs");
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    true
                }
            };

            if wait {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        heartbeat.abort();
        tracing::info!(
            polls = self.stats.polls,
            completed = self.stats.completed,
            failed = self.stats.failed,
            retried = self.stats.retried,
            cancelled = self.stats.cancelled,
            "Worker stopped"
        );
        Ok(())
    }

    /// Claim and process at most one job
    pub async fn run_once(&mut self) -> Result<Option<JobOutcome>> {
        self.stats.poll();
        match self.store.claim_next_job(&self.config.job_types)? {
            Some(job) => Ok(Some(self.process_job(job).await)),
            None => {
                tracing::info!(job_types = ?self.config.job_types, "No pending jobs");
                Ok(None)
            }
        }
    }

    /// Run one claimed job and record how it ended
    pub async fn process_job(&mut self, job: BackgroundJob) -> JobOutcome {
        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            delegated = job.job_type.is_delegated(),
            attempt = job.retry_count + 1,
            "Processing job"
        );

        let outcome = match self.dispatch(&job).await {
            Ok(HandlerOutcome::Completed { progress }) => self.record_completion(&job, progress),
            Ok(HandlerOutcome::Cancelled { progress }) => self.record_cancellation(&job, progress),
            Err(error) => self.record_failure(&job, error),
        };

        self.stats.record(&outcome);
        tracing::info!(
            job_id = %job.id,
            outcome = ?outcome,
            completed = self.stats.completed,
            failed = self.stats.failed,
            "Job finished"
        );
        outcome
    }

    async fn dispatch(&self, job: &BackgroundJob) -> std::result::Result<HandlerOutcome, JobError> {
        let params = job.typed_params()?;
        let cancellation = StoreCancellation::new(self.store.clone(), &job.id);

        match params {
            JobParams::RecomputeFinalScores { weight_config_id } => handlers::recompute::run(
                self.store.as_ref(),
                job,
                &weight_config_id,
                &cancellation,
                &self.config,
            ),
            JobParams::BackfillDimension { dimension } => {
                let scorer = self.scorer.as_ref().ok_or_else(|| {
                    JobError::Permanent(
                        "backfill_dimension needs an LLM client; worker has none".to_string(),
                    )
                })?;
                handlers::backfill::run(
                    self.store.as_ref(),
                    scorer,
                    job,
                    dimension,
                    &cancellation,
                    &self.config,
                )
                .await
            }
            JobParams::FetchPermalink { url, post_id } => {
                let invocation = self.delegation.permalink_invocation(&url, post_id.as_deref());
                handlers::external::run(self.runner.as_ref(), job, &invocation, &cancellation).await
            }
            JobParams::RunScraper { feed_type } => {
                let invocation = self.delegation.scraper_invocation(feed_type);
                handlers::external::run(self.runner.as_ref(), job, &invocation, &cancellation).await
            }
        }
    }

    fn record_completion(&self, job: &BackgroundJob, progress: Option<i64>) -> JobOutcome {
        match self.store.complete_job(&job.id, progress) {
            Ok(true) => JobOutcome::Completed,
            Ok(false) => {
                tracing::warn!(
                    job_id = %job.id,
                    "Job left running state before completion was recorded"
                );
                self.record_cancellation(job, progress.unwrap_or(job.progress))
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                JobOutcome::Failed { message: e.to_string() }
            }
        }
    }

    fn record_cancellation(&self, job: &BackgroundJob, progress: i64) -> JobOutcome {
        if let Err(e) = self.store.finish_cancelled(&job.id, progress) {
            tracing::error!(job_id = %job.id, error = %e, "Failed to finalize cancelled job");
        }
        JobOutcome::Cancelled
    }

    fn record_failure(&self, job: &BackgroundJob, error: JobError) -> JobOutcome {
        match self.store.clear_staging(&job.id) {
            Ok(0) => {}
            Ok(discarded) => tracing::debug!(job_id = %job.id, discarded, "Discarded staged rows"),
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to clean up staging"),
        }

        if matches!(self.store.job_status(&job.id), Ok(JobStatus::Cancelled)) {
            tracing::info!(
                job_id = %job.id,
                error = %error,
                "Job failed after cancellation; keeping cancelled"
            );
            return self.record_cancellation(job, job.progress);
        }

        let written = match decide(job, &error, self.config.max_error_length) {
            RetryDecision::Requeue { retry_count, message } => {
                tracing::warn!(
                    job_id = %job.id,
                    retry_count,
                    max_retries = job.max_retries,
                    error = %message,
                    "Transient job failure, requeued"
                );
                self.store
                    .requeue_job(&job.id, retry_count, &message)
                    .map(|_| JobOutcome::Retried { retry_count })
            }
            RetryDecision::Fail { message } => {
                tracing::error!(
                    job_id = %job.id,
                    permanent = error.is_permanent(),
                    error = %message,
                    "Job failed"
                );
                self.store
                    .fail_job(&job.id, &message)
                    .map(|_| JobOutcome::Failed { message })
            }
        };

        written.unwrap_or_else(|e| {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
            JobOutcome::Failed { message: e.to_string() }
        })
    }
}
