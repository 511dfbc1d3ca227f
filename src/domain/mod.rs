//! Domain types for Postrank
//!
//! This module contains the core domain types:
//! - Dimension / TopicCategory: the closed scoring and category vocabularies
//! - Post / PostScoreResult: posts and their scoring outcome
//! - BackgroundJob / JobParams: background job rows and typed params
//! - WeightConfig / NoveltyConfig: ranking configuration

pub mod dimension;
pub mod job;
pub mod post;
pub mod ranking;

pub use dimension::{Dimension, DimensionScores, TopicCategory, scores_from_json, scores_to_json};
pub use job::{BackgroundJob, FeedType, JobParams, JobStatus, JobType};
pub use post::{Post, PostScoreResult, SaveStats};
pub use ranking::{FrequencyThresholds, NoveltyConfig, TopicFrequencies, WeightConfig};
