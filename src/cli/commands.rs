//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - worker: run the background job worker
//! - score: score unscored posts with the model
//! - enqueue / cancel / jobs: manage background jobs
//! - recount-topics: rebuild topic frequencies from recent scores

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Postrank - LLM post scoring and background ranking jobs
#[derive(Parser, Debug)]
#[command(name = "postrank")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the background job worker
    Worker {
        /// Comma-separated job types to claim (defaults to the configured list)
        #[arg(short = 't', long)]
        job_type: Option<String>,

        /// Seconds to sleep when the queue is empty
        #[arg(short, long)]
        poll_interval: Option<u64>,

        /// Process at most one job, then exit
        #[arg(long)]
        once: bool,
    },

    /// Score posts that have no score row yet
    Score {
        /// Maximum posts to score
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Create a pending background job
    Enqueue {
        /// Job type (recompute_final_scores, backfill_dimension, fetch_permalink, run_scraper)
        job_type: String,

        /// Job params as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Retries before the job is marked as error
        #[arg(short, long)]
        max_retries: Option<u32>,
    },

    /// Request cancellation of a pending or running job
    Cancel {
        /// Job ID to cancel
        id: String,
    },

    /// List background jobs, newest first
    Jobs {
        /// Filter by status (pending, running, completed, error, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Rebuild topic frequencies from recent scores
    RecountTopics {
        /// Window of score rows to count, in days (default: the stored
        /// novelty config's window)
        #[arg(short, long)]
        window_days: Option<u32>,
    },
}
