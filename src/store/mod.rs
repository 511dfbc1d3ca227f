//! Storage layer for Postrank.
//!
//! [`JobStore`] is the contract the scorer and the job worker depend on:
//! job rows, posts, score rows, weight configs, settings, topic frequencies
//! and the staging/ranking tables. [`SqliteStore`] implements it on a single
//! SQLite database.
//!
//! # Example
//!
//! ```ignore
//! use postrank::store::{JobStore, SqliteStore};
//! use postrank::domain::JobType;
//!
//! let store = SqliteStore::open(Path::new("postrank.db"))?;
//! let job = store.create_job(JobType::RecomputeFinalScores, &json!({"weight_config_id": id}), 3)?;
//! let claimed = store.claim_next_job(&[JobType::RecomputeFinalScores])?;
//! ```

mod records;
mod sqlite;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{
    BackgroundJob, Dimension, JobStatus, JobType, NoveltyConfig, Post, TopicFrequencies,
    WeightConfig,
};
use crate::error::Result;

pub use records::{RankedScore, ScoreRecord, StoredScore};
pub use sqlite::SqliteStore;

/// Settings key holding the novelty configuration
pub const NOVELTY_CONFIG_KEY: &str = "novelty_config";

/// Backing-store operations used by the scorer and the job worker.
///
/// Implementations must make `claim_next_job` atomic (two workers can never
/// claim the same job) and `apply_staged_scores` all-or-nothing. Terminal job
/// writes only apply to rows that are still `running`, and report whether
/// they did.
pub trait JobStore: Send + Sync {
    //=== Jobs ===

    fn create_job(
        &self,
        job_type: JobType,
        params: &Value,
        max_retries: u32,
    ) -> Result<BackgroundJob>;

    /// Fetch a job, `JobNotFound` if absent
    fn get_job(&self, id: &str) -> Result<BackgroundJob>;

    fn job_status(&self, id: &str) -> Result<JobStatus>;

    /// Atomically move the oldest pending job of the given types to running
    fn claim_next_job(&self, types: &[JobType]) -> Result<Option<BackgroundJob>>;

    fn set_job_total(&self, id: &str, total: i64) -> Result<()>;

    /// Persist progress, clamped to the job's total when known
    fn set_job_progress(&self, id: &str, progress: i64) -> Result<()>;

    fn complete_job(&self, id: &str, progress: Option<i64>) -> Result<bool>;

    fn fail_job(&self, id: &str, message: &str) -> Result<bool>;

    /// Back to pending for another attempt
    fn requeue_job(&self, id: &str, retry_count: u32, message: &str) -> Result<bool>;

    /// Record completion time and final progress on a job already cancelled
    fn finish_cancelled(&self, id: &str, progress: i64) -> Result<()>;

    /// Cancel a pending or running job; false if it had already finished
    fn cancel_job(&self, id: &str) -> Result<bool>;

    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<BackgroundJob>>;

    //=== Posts and score rows ===

    fn insert_post(&self, post: &Post) -> Result<()>;

    /// Posts with no score row, oldest first
    fn unscored_posts(&self, limit: usize) -> Result<Vec<Post>>;

    fn count_scores(&self) -> Result<i64>;

    /// Score rows ordered by post id
    fn fetch_scores_page(&self, offset: usize, limit: usize) -> Result<Vec<StoredScore>>;

    /// Upsert many score rows in one write
    fn upsert_scores(&self, records: &[ScoreRecord]) -> Result<()>;

    fn upsert_score(&self, record: &ScoreRecord) -> Result<()>;

    fn score_record(&self, post_id: &str) -> Result<Option<ScoreRecord>>;

    /// Scored posts whose scores lack `dimension`, in id order, starting
    /// after the `after` id when given
    fn posts_missing_dimension(
        &self,
        dimension: Dimension,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    fn count_posts_missing_dimension(&self, dimension: Dimension) -> Result<i64>;

    /// Set `dimension` on existing score rows; returns rows touched
    fn merge_dimension(&self, dimension: Dimension, updates: &[(String, f64)]) -> Result<usize>;

    //=== Staging and live rankings ===

    fn stage_scores(
        &self,
        job_id: &str,
        weight_config_id: &str,
        scores: &[RankedScore],
    ) -> Result<()>;

    fn clear_staging(&self, job_id: &str) -> Result<usize>;

    fn count_staged(&self, job_id: &str) -> Result<i64>;

    /// Promote a job's staged rows into `post_scores` and delete them, atomically
    fn apply_staged_scores(&self, job_id: &str, weight_config_id: &str) -> Result<usize>;

    /// Write live ranking rows directly (real-time scoring path)
    fn upsert_post_scores(&self, weight_config_id: &str, scores: &[RankedScore]) -> Result<()>;

    fn post_score(&self, post_id: &str, weight_config_id: &str) -> Result<Option<f64>>;

    //=== Configuration ===

    fn active_weight_config_id(&self) -> Result<Option<String>>;

    /// Load and validate a weight config; `None` if no such row
    fn weight_config(&self, id: &str) -> Result<Option<WeightConfig>>;

    fn insert_weight_config(&self, name: &str, weights: &Value, activate: bool) -> Result<String>;

    fn novelty_config(&self) -> Result<NoveltyConfig>;

    fn set_setting(&self, key: &str, value: &Value) -> Result<()>;

    //=== Topic frequencies ===

    fn topic_frequencies(&self) -> Result<TopicFrequencies>;

    fn topic_frequency(&self, category: &str) -> Result<Option<i64>>;

    /// Add counts for several categories in one write
    fn increment_topic_frequencies(&self, counts: &BTreeMap<String, i64>) -> Result<()>;

    fn increment_topic_frequency(&self, category: &str, by: i64) -> Result<()>;

    fn set_topic_frequency(&self, category: &str, count: i64) -> Result<()>;

    /// Rebuild every category's rolling count from score rows created in the
    /// last `window_days` days; returns the number of categories seen
    fn recount_topic_frequencies(&self, window_days: u32) -> Result<usize>;
}
