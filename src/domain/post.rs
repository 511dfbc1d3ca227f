//! Posts and per-post scoring results

use serde::{Deserialize, Serialize};

use crate::domain::dimension::{DimensionScores, TopicCategory};

/// A post already ingested into storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
}

impl Post {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Outcome of scoring one post.
///
/// A result carrying an `error` is excluded from persistence, topic counts
/// and final-score computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostScoreResult {
    pub post_id: String,
    pub scores: DimensionScores,
    pub categories: Vec<TopicCategory>,
    pub summary: Option<String>,
    pub why: Option<String>,
    pub final_score: Option<f64>,
    pub error: Option<String>,
}

impl PostScoreResult {
    /// Build an error result for a post
    pub fn failed(post_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters returned by `save_scores`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveStats {
    pub saved: usize,
    pub skipped: usize,
    pub errors: usize,
}
