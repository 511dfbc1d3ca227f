//! fetch_permalink / run_scraper
//!
//! Both job types hand off to the external scraper as a subprocess. The
//! worker only does status bookkeeping and checks for cancellation before
//! and after the call, so a job cancelled mid-run is never overwritten.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::daemon::cancel::CancellationCheck;
use crate::daemon::handlers::HandlerOutcome;
use crate::daemon::retry::JobError;
use crate::domain::{BackgroundJob, FeedType};
use crate::error::{PostrankError, Result};

/// One subprocess call
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl ExternalInvocation {
    /// Build from a command line (`argv[0]` is the program) plus extra args
    pub fn from_command(
        command: &[String],
        extra: Vec<String>,
        working_dir: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        let (program, base) = match command.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args: base.into_iter().chain(extra).collect(),
            working_dir,
            timeout,
        }
    }
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExternalOutput {
    /// stderr, else stdout, else the exit status
    pub fn failure_message(&self, program: &str) -> String {
        if !self.stderr.trim().is_empty() {
            return self.stderr.trim().to_string();
        }
        if !self.stdout.trim().is_empty() {
            return self.stdout.trim().to_string();
        }
        match self.code {
            Some(code) => format!("{} exited with {}", program, code),
            None => format!("{} terminated by signal", program),
        }
    }
}

/// Runs delegated commands
#[async_trait]
pub trait ExternalRunner: Send + Sync {
    /// Run to completion; `Timeout` when the wall-clock limit is hit
    async fn run(&self, invocation: &ExternalInvocation) -> Result<ExternalOutput>;
}

/// Runs commands as child processes with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ExternalRunner for ProcessRunner {
    async fn run(&self, invocation: &ExternalInvocation) -> Result<ExternalOutput> {
        if invocation.program.is_empty() {
            return Err(PostrankError::Config("external command is empty".to_string()));
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            PostrankError::External(format!("failed to start {}: {}", invocation.program, e))
        })?;

        match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(ExternalOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => Err(PostrankError::Timeout(invocation.timeout)),
        }
    }
}

/// Command lines and limits for delegated jobs
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationConfig {
    /// Permalink scraper; gets `--permalink <url> [--post-id <id>]`
    pub permalink_command: Vec<String>,
    /// Feed scraper; gets the feed type as its last argument
    pub scraper_command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub permalink_timeout: Duration,
    pub scraper_timeout: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            permalink_command: vec!["python".to_string(), "-m".to_string(), "src.main".to_string()],
            scraper_command: vec!["scripts/run-scrape.sh".to_string()],
            working_dir: None,
            permalink_timeout: Duration::from_secs(300),
            scraper_timeout: Duration::from_secs(7200),
        }
    }
}

impl DelegationConfig {
    pub fn permalink_invocation(&self, url: &str, post_id: Option<&str>) -> ExternalInvocation {
        let mut extra = vec!["--permalink".to_string(), url.to_string()];
        if let Some(post_id) = post_id {
            extra.push("--post-id".to_string());
            extra.push(post_id.to_string());
        }
        ExternalInvocation::from_command(
            &self.permalink_command,
            extra,
            self.working_dir.clone(),
            self.permalink_timeout,
        )
    }

    pub fn scraper_invocation(&self, feed_type: FeedType) -> ExternalInvocation {
        ExternalInvocation::from_command(
            &self.scraper_command,
            vec![feed_type.as_str().to_string()],
            self.working_dir.clone(),
            self.scraper_timeout,
        )
    }
}

/// Run a delegated job. Failures of the external command are terminal.
pub async fn run(
    runner: &dyn ExternalRunner,
    job: &BackgroundJob,
    invocation: &ExternalInvocation,
    cancellation: &dyn CancellationCheck,
) -> std::result::Result<HandlerOutcome, JobError> {
    if cancellation.is_cancelled()? {
        tracing::info!(job_id = %job.id, "Delegated job cancelled before run");
        return Ok(HandlerOutcome::Cancelled { progress: job.progress });
    }

    tracing::info!(
        job_id = %job.id,
        program = %invocation.program,
        args = ?invocation.args,
        "Running delegated job"
    );
    let result = runner.run(invocation).await;

    if cancellation.is_cancelled()? {
        tracing::info!(job_id = %job.id, "Delegated job cancelled during run, result discarded");
        return Ok(HandlerOutcome::Cancelled { progress: job.progress });
    }

    match result {
        Ok(output) if output.success => Ok(HandlerOutcome::Completed { progress: None }),
        Ok(output) => Err(JobError::Permanent(output.failure_message(&invocation.program))),
        Err(PostrankError::Timeout(limit)) => Err(JobError::Permanent(format!(
            "Scraper timed out after {}s",
            limit.as_secs()
        ))),
        Err(e) => Err(JobError::Permanent(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::domain::{JobStatus, JobType};
    use serde_json::json;

    /// Records invocations and returns a fixed result
    struct FakeRunner {
        output: Option<ExternalOutput>,
        calls: Mutex<Vec<ExternalInvocation>>,
    }

    impl FakeRunner {
        fn returning(output: Option<ExternalOutput>) -> Self {
            Self {
                output,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExternalRunner for FakeRunner {
        async fn run(&self, invocation: &ExternalInvocation) -> Result<ExternalOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            self.output.clone().ok_or(PostrankError::Timeout(invocation.timeout))
        }
    }

    struct Flag(bool);

    impl CancellationCheck for Flag {
        fn is_cancelled(&self) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn job() -> BackgroundJob {
        BackgroundJob {
            id: "job-ext".to_string(),
            job_type: JobType::FetchPermalink,
            status: JobStatus::Running,
            params: json!({"url": "https://example.com/p/1"}),
            progress: 0,
            total: None,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            started_at: None,
            completed_at: None,
            last_retry_at: None,
        }
    }

    fn output(success: bool, code: i32, stderr: &str) -> ExternalOutput {
        ExternalOutput {
            success,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_invocations() {
        let config = DelegationConfig::default();

        let permalink = config.permalink_invocation("https://x/p/1", Some("p1"));
        assert_eq!(permalink.program, "python");
        assert_eq!(
            permalink.args,
            vec!["-m", "src.main", "--permalink", "https://x/p/1", "--post-id", "p1"]
        );
        assert_eq!(permalink.timeout, Duration::from_secs(300));

        let scraper = config.scraper_invocation(FeedType::Trending);
        assert_eq!(scraper.program, "scripts/run-scrape.sh");
        assert_eq!(scraper.args, vec!["trending"]);
        assert_eq!(scraper.timeout, Duration::from_secs(7200));
    }

    #[test]
    fn test_failure_message_fallbacks() {
        assert_eq!(output(false, 2, "boom\n").failure_message("scrape"), "boom");
        assert_eq!(output(false, 2, "").failure_message("scrape"), "scrape exited with 2");
    }

    #[tokio::test]
    async fn test_success_completes() {
        let runner = FakeRunner::returning(Some(output(true, 0, "")));
        let invocation = DelegationConfig::default().scraper_invocation(FeedType::Recent);

        let outcome = run(&runner, &job(), &invocation, &Flag(false)).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Completed { progress: None });
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_permanent() {
        let runner = FakeRunner::returning(Some(output(false, 1, "login expired")));
        let invocation = DelegationConfig::default().scraper_invocation(FeedType::Recent);

        let err = run(&runner, &job(), &invocation, &Flag(false)).await.unwrap_err();
        assert_eq!(err, JobError::Permanent("login expired".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_permanent() {
        let runner = FakeRunner::returning(None);
        let invocation = DelegationConfig::default().permalink_invocation("u", None);

        let err = run(&runner, &job(), &invocation, &Flag(false)).await.unwrap_err();
        assert_eq!(err, JobError::Permanent("Scraper timed out after 300s".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_run() {
        let runner = FakeRunner::returning(Some(output(true, 0, "")));
        let invocation = DelegationConfig::default().permalink_invocation("u", None);

        let outcome = run(&runner, &job(), &invocation, &Flag(true)).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Cancelled { progress: 0 });
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let invocation = ExternalInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            working_dir: None,
            timeout: Duration::from_secs(10),
        };

        let output = ProcessRunner.run(&invocation).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.failure_message("sh"), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_times_out() {
        let invocation = ExternalInvocation {
            program: "sleep".to_string(),
            args: vec!["5".to_string()],
            working_dir: None,
            timeout: Duration::from_millis(50),
        };

        let err = ProcessRunner.run(&invocation).await.unwrap_err();
        assert!(matches!(err, PostrankError::Timeout(_)));
    }
}
