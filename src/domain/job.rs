//! Background job records and typed params
//!
//! Jobs are created by operators (or the admin UI) and picked up by the
//! worker. Params arrive as an untyped JSON object and are validated exactly
//! once, at dispatch, into a [`JobParams`] variant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::dimension::Dimension;
use crate::error::{PostrankError, Result};

/// Closed set of job kinds the worker knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RecomputeFinalScores,
    BackfillDimension,
    FetchPermalink,
    RunScraper,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::RecomputeFinalScores,
        JobType::BackfillDimension,
        JobType::FetchPermalink,
        JobType::RunScraper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::RecomputeFinalScores => "recompute_final_scores",
            JobType::BackfillDimension => "backfill_dimension",
            JobType::FetchPermalink => "fetch_permalink",
            JobType::RunScraper => "run_scraper",
        }
    }

    /// Jobs that hand off to the external scraper instead of running in-process
    pub fn is_delegated(&self) -> bool {
        matches!(self, JobType::FetchPermalink | JobType::RunScraper)
    }

    /// Parse a comma-separated filter such as `"recompute_final_scores,run_scraper"`
    pub fn parse_list(s: &str) -> Result<Vec<JobType>> {
        let types = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<JobType>().map_err(PostrankError::Config))
            .collect::<Result<Vec<_>>>()?;

        if types.is_empty() {
            return Err(PostrankError::Config("job type filter is empty".to_string()));
        }
        Ok(types)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type '{}'", s))
    }
}

/// Status of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed (also the state after a transient retry)
    Pending,
    /// Claimed by a worker
    Running,
    Completed,
    Error,
    /// Set externally; observed cooperatively by the worker
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Error,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Cancellation is only accepted before the job has finished
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// A background job row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Raw params as stored; see [`JobParams::parse`]
    pub params: Value,
    pub progress: i64,
    pub total: Option<i64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_retry_at: Option<String>,
}

impl BackgroundJob {
    /// Typed params for this job
    pub fn typed_params(&self) -> Result<JobParams> {
        JobParams::parse(self.job_type, &self.params)
    }

    pub fn retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Which scraper feed a `run_scraper` job pulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Recent,
    Trending,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Recent => "recent",
            FeedType::Trending => "trending",
        }
    }

    /// Unknown or missing values fall back to `Recent`
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("trending") => FeedType::Trending,
            _ => FeedType::Recent,
        }
    }
}

/// Validated, per-type job parameters
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    RecomputeFinalScores { weight_config_id: String },
    BackfillDimension { dimension: Dimension },
    FetchPermalink { url: String, post_id: Option<String> },
    RunScraper { feed_type: FeedType },
}

impl JobParams {
    /// Validate a raw params object for the given job type.
    ///
    /// Missing or malformed required keys yield `InvalidParams`, which the
    /// worker treats as a permanent failure. Unknown keys are ignored.
    pub fn parse(job_type: JobType, params: &Value) -> Result<Self> {
        let empty = serde_json::Map::new();
        let obj = match params {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            other => {
                return Err(PostrankError::InvalidParams(format!(
                    "params must be a JSON object, got {}",
                    other
                )));
            }
        };

        let required_str = |key: &str| -> Result<String> {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    PostrankError::InvalidParams(format!("Missing {} in job params", key))
                })
        };

        match job_type {
            JobType::RecomputeFinalScores => Ok(JobParams::RecomputeFinalScores {
                weight_config_id: required_str("weight_config_id")?,
            }),
            JobType::BackfillDimension => {
                let name = required_str("dimension")?;
                let dimension = name.parse::<Dimension>().map_err(PostrankError::InvalidParams)?;
                Ok(JobParams::BackfillDimension { dimension })
            }
            JobType::FetchPermalink => {
                let url = required_str("url")?;
                let post_id = obj
                    .get("post_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string);
                Ok(JobParams::FetchPermalink { url, post_id })
            }
            JobType::RunScraper => Ok(JobParams::RunScraper {
                feed_type: FeedType::parse_lenient(obj.get("feed_type").and_then(Value::as_str)),
            }),
        }
    }
}
