//! Liveness heartbeat for the worker

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Spawn a task that logs liveness every `interval` until aborted
pub fn spawn(interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracing::info!(uptime_secs = started.elapsed().as_secs(), "Worker alive");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_runs_until_aborted() {
        let handle = spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        handle.abort();
        let joined = handle.await;
        assert!(joined.unwrap_err().is_cancelled());
    }
}
