//! Row types exchanged with the job store

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{DimensionScores, PostScoreResult, TopicCategory};

/// A persisted LLM score row (`llm_scores`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub post_id: String,
    pub scores: DimensionScores,
    pub categories: Vec<TopicCategory>,
    pub summary: Option<String>,
    pub why: Option<String>,
    pub final_score: Option<f64>,
    pub model_version: String,
}

impl ScoreRecord {
    /// Build a record from a successful scoring result
    pub fn from_result(result: &PostScoreResult, model_version: &str) -> Self {
        Self {
            post_id: result.post_id.clone(),
            scores: result.scores.clone(),
            categories: result.categories.clone(),
            summary: result.summary.clone(),
            why: result.why.clone(),
            final_score: result.final_score,
            model_version: model_version.to_string(),
        }
    }
}

/// Raw score row as read back for recomputation.
///
/// `scores` and `categories` are left as stored JSON so rows written by other
/// tools with unexpected shapes can be skipped instead of failing the page.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredScore {
    pub post_id: String,
    pub scores: Value,
    pub categories: Value,
}

/// One computed final score, bound for staging or the live ranking table
#[derive(Debug, Clone, PartialEq)]
pub struct RankedScore {
    pub post_id: String,
    pub final_score: f64,
}

impl RankedScore {
    pub fn new(post_id: impl Into<String>, final_score: f64) -> Self {
        Self {
            post_id: post_id.into(),
            final_score,
        }
    }
}
