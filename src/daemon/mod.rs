//! Job worker - poll loop, handlers, retry and cancellation
//!
//! The worker is the long-running process that:
//! - Claims pending background jobs of the configured types
//! - Dispatches each to its handler (recompute, backfill, delegated scraper)
//! - Applies the retry policy and records the outcome on the job row

pub mod cancel;
pub mod handlers;
pub mod heartbeat;
pub mod orchestrator;
pub mod retry;
pub mod tick;

pub use cancel::{CancellationCheck, StoreCancellation};
pub use handlers::{
    DelegationConfig, ExternalInvocation, ExternalOutput, ExternalRunner, HandlerOutcome,
    ProcessRunner,
};
pub use orchestrator::Orchestrator;
pub use retry::{JobError, RetryDecision};
pub use tick::{JobOutcome, PollConfig, WorkerStats};
