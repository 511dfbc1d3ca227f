//! recompute_final_scores
//!
//! Recomputes every stored score row's final score under one weight config.
//! Results go to the job's staging rows and are promoted to live rankings in
//! a single transaction once every page has been processed.

use crate::daemon::cancel::CancellationCheck;
use crate::daemon::handlers::HandlerOutcome;
use crate::daemon::retry::JobError;
use crate::daemon::tick::PollConfig;
use crate::domain::{BackgroundJob, scores_from_json};
use crate::scoring::RankingInputs;
use crate::store::{JobStore, RankedScore, StoredScore};

/// Final score for one stored row, `None` when the row is malformed
pub fn rank_row(inputs: &RankingInputs<'_>, row: &StoredScore) -> Option<RankedScore> {
    if !row.scores.is_object() {
        tracing::warn!(post_id = %row.post_id, "Skipping score row: scores is not an object");
        return None;
    }
    let Some(categories) = row.categories.as_array() else {
        tracing::warn!(post_id = %row.post_id, "Skipping score row: categories is not an array");
        return None;
    };

    let categories: Vec<&str> = categories.iter().filter_map(|c| c.as_str()).collect();
    let scores = scores_from_json(&row.scores);
    Some(RankedScore::new(&row.post_id, inputs.score(&scores, &categories)))
}

fn cancel(
    store: &dyn JobStore,
    job: &BackgroundJob,
    progress: i64,
) -> Result<HandlerOutcome, JobError> {
    let discarded = store.clear_staging(&job.id)?;
    tracing::info!(job_id = %job.id, discarded, "Job cancelled, staging discarded");
    Ok(HandlerOutcome::Cancelled { progress })
}

pub fn run(
    store: &dyn JobStore,
    job: &BackgroundJob,
    weight_config_id: &str,
    cancellation: &dyn CancellationCheck,
    config: &PollConfig,
) -> Result<HandlerOutcome, JobError> {
    let weight_config = store.weight_config(weight_config_id)?.ok_or_else(|| {
        JobError::Permanent(format!("Weight config {} not found", weight_config_id))
    })?;
    let novelty = store.novelty_config()?;
    let frequencies = store.topic_frequencies()?;
    let total = store.count_scores()?;

    let inputs = RankingInputs {
        weights: &weight_config.weights,
        novelty: &novelty,
        frequencies: &frequencies,
        total_scored_count: Some(total),
    };

    store.set_job_total(&job.id, total)?;
    // leftovers from an earlier failed attempt
    store.clear_staging(&job.id)?;

    let batch_size = config.recompute_batch_size.max(1);
    tracing::info!(
        job_id = %job.id,
        weight_config_id,
        total,
        batch_size,
        "Recomputing final scores"
    );

    let mut offset = 0usize;
    let mut processed = 0i64;
    let mut batch_index = 0usize;

    loop {
        if config.is_cancel_checkpoint(batch_index) && cancellation.is_cancelled()? {
            return cancel(store, job, processed);
        }

        let page = store.fetch_scores_page(offset, batch_size)?;
        if page.is_empty() {
            store.set_job_progress(&job.id, processed)?;
            break;
        }

        let ranked: Vec<RankedScore> =
            page.iter().filter_map(|row| rank_row(&inputs, row)).collect();
        store.stage_scores(&job.id, weight_config_id, &ranked)?;

        offset += page.len();
        processed += page.len() as i64;
        let is_last = page.len() < batch_size || processed >= total;

        if config.is_progress_checkpoint(batch_index, is_last) {
            store.set_job_progress(&job.id, processed)?;
        }
        tracing::debug!(
            job_id = %job.id,
            batch_index,
            rows = page.len(),
            staged = ranked.len(),
            "Recompute batch staged"
        );

        batch_index += 1;
        if is_last {
            break;
        }
    }

    if cancellation.is_cancelled()? {
        return cancel(store, job, processed);
    }

    let applied = store.apply_staged_scores(&job.id, weight_config_id)?;
    tracing::info!(job_id = %job.id, applied, processed, "Staged scores promoted");
    Ok(HandlerOutcome::Completed {
        progress: Some(processed),
    })
}
