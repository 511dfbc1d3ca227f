//! backfill_dimension
//!
//! Scores one dimension for scored posts that lack it and merges the values
//! into their existing score rows, a page at a time.

use crate::daemon::cancel::CancellationCheck;
use crate::daemon::handlers::HandlerOutcome;
use crate::daemon::retry::JobError;
use crate::daemon::tick::PollConfig;
use crate::domain::{BackgroundJob, Dimension};
use crate::scoring::LlmScorer;
use crate::store::JobStore;

pub async fn run(
    store: &dyn JobStore,
    scorer: &LlmScorer,
    job: &BackgroundJob,
    dimension: Dimension,
    cancellation: &dyn CancellationCheck,
    config: &PollConfig,
) -> Result<HandlerOutcome, JobError> {
    let total = store.count_posts_missing_dimension(dimension)?;
    store.set_job_total(&job.id, total)?;
    tracing::info!(job_id = %job.id, %dimension, total, "Backfilling dimension");

    let page_size = config.backfill_batch_size.max(1);
    let mut processed = 0i64;
    let mut skipped = 0i64;
    let mut cursor: Option<String> = None;
    let mut batch_index = 0usize;

    loop {
        if config.is_cancel_checkpoint(batch_index) && cancellation.is_cancelled()? {
            tracing::info!(job_id = %job.id, processed, "Backfill cancelled");
            return Ok(HandlerOutcome::Cancelled { progress: processed });
        }

        let posts = store.posts_missing_dimension(dimension, cursor.as_deref(), page_size)?;
        let Some(last) = posts.last() else {
            break;
        };
        cursor = Some(last.id.clone());

        let updates = scorer.score_single_dimension(&posts, dimension).await?;
        let merged = if updates.is_empty() {
            0
        } else {
            store.merge_dimension(dimension, &updates)?
        };
        processed += merged as i64;
        skipped += posts.len().saturating_sub(merged) as i64;

        if config.is_progress_checkpoint(batch_index, false) {
            store.set_job_progress(&job.id, processed)?;
        }
        tracing::debug!(job_id = %job.id, batch_index, merged, skipped, "Backfill page done");
        batch_index += 1;
    }

    if skipped > 0 {
        tracing::warn!(
            job_id = %job.id,
            %dimension,
            skipped,
            "Posts left without a value; a later backfill will retry them"
        );
    }
    tracing::info!(job_id = %job.id, %dimension, processed, skipped, "Backfill finished");
    Ok(HandlerOutcome::Completed {
        progress: Some(processed),
    })
}
