//! Per-job-type handlers
//!
//! Handlers do the work of one job attempt and report how it ended. They
//! never write terminal job status; the orchestrator does that in one place.

pub mod backfill;
pub mod external;
pub mod recompute;

pub use external::{
    DelegationConfig, ExternalInvocation, ExternalOutput, ExternalRunner, ProcessRunner,
};

/// How a handler finished an attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Work done; `progress` is the final counter when the handler tracks one
    Completed { progress: Option<i64> },
    /// Cancellation observed at a checkpoint; staging already discarded
    Cancelled { progress: i64 },
}
