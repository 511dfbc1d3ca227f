//! Postrank - LLM post scoring and ranking jobs
//!
//! Postrank scores social-feed posts on fixed humor dimensions with an LLM,
//! ranks them with a weighted, novelty-adjusted final score, and runs the
//! background jobs that keep rankings current (recompute, dimension
//! backfill, delegated scrapes).

pub mod daemon;
pub mod domain;
pub mod error;
pub mod id;
pub mod llm;
pub mod scoring;
pub mod store;

pub use error::{PostrankError, Result};
