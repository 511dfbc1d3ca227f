//! Post scoring and ranking
//!
//! - `validator`: raw model output to bounded scores and categories
//! - `novelty`: topic-frequency multiplier
//! - `final_score`: weighted, novelty-adjusted final score
//! - `repair` / `backoff`: JSON repair ladder and API retry around each call
//! - `ensemble`: median aggregation across runs
//! - `scorer`: the batch/ensemble scorer and persistence entry point

pub mod backoff;
pub mod ensemble;
pub mod final_score;
pub mod novelty;
pub mod prompts;
pub mod repair;
pub mod scorer;
pub mod validator;

pub use backoff::BackoffPolicy;
pub use final_score::{RankingInputs, weighted_score};
pub use novelty::novelty;
pub use scorer::{LlmScorer, ScorerSettings};
