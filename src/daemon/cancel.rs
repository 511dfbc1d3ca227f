//! Cooperative cancellation
//!
//! Cancellation is requested by setting a job's status to `cancelled` in the
//! store. Long-running handlers poll a [`CancellationCheck`] at their
//! checkpoints instead of re-reading job rows themselves.

use std::sync::Arc;

use crate::domain::JobStatus;
use crate::error::Result;
use crate::store::JobStore;

/// Answers "has this job been cancelled?"
pub trait CancellationCheck: Send + Sync {
    fn is_cancelled(&self) -> Result<bool>;
}

/// Reads the job's status from the store on each check
pub struct StoreCancellation {
    store: Arc<dyn JobStore>,
    job_id: String,
}

impl StoreCancellation {
    pub fn new(store: Arc<dyn JobStore>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }
}

impl CancellationCheck for StoreCancellation {
    fn is_cancelled(&self) -> Result<bool> {
        Ok(self.store.job_status(&self.job_id)? == JobStatus::Cancelled)
    }
}
