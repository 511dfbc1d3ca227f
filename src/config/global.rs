//! Global configuration.
//!
//! Loaded from ./postrank.yml or ~/.config/postrank/postrank.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use postrank::daemon::{DelegationConfig, PollConfig};
use postrank::domain::JobType;
use postrank::llm::AnthropicConfig;
use postrank::scoring::{BackoffPolicy, ScorerSettings};

/// Global configuration for Postrank.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,

    /// Model API settings.
    pub llm: LlmConfig,

    /// Scorer tunables.
    pub scoring: ScoringConfig,

    /// Job worker settings.
    pub worker: WorkerConfig,

    /// Delegated scraper commands.
    pub scraper: ScraperConfig,

    /// Log file; stderr when unset.
    #[serde(rename = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. postrank.yml in current directory
    /// 3. ~/.config/postrank/postrank.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from("postrank.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from postrank.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load postrank.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("postrank").join("postrank.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scoring.batch_size == 0 {
            eyre::bail!("scoring.batch-size must be > 0");
        }
        if self.scoring.ensemble_runs == 0 {
            eyre::bail!("scoring.ensemble-runs must be > 0");
        }
        if self.scoring.parse_attempts == 0 || self.scoring.api_attempts == 0 {
            eyre::bail!("scoring.parse-attempts and scoring.api-attempts must be > 0");
        }
        if self.scoring.backoff_min_ms > self.scoring.backoff_max_ms {
            eyre::bail!("scoring.backoff-min-ms must not exceed scoring.backoff-max-ms");
        }
        if self.worker.poll_interval_secs == 0 || self.worker.heartbeat_interval_secs == 0 {
            eyre::bail!("worker.poll-interval-secs and worker.heartbeat-interval-secs must be > 0");
        }
        if self.worker.recompute_batch_size == 0 || self.worker.backfill_batch_size == 0 {
            eyre::bail!("worker batch sizes must be > 0");
        }
        if self.worker.cancel_check_interval == 0 || self.worker.progress_interval == 0 {
            eyre::bail!("worker.cancel-check-interval and worker.progress-interval must be > 0");
        }
        if self.worker.max_error_length == 0 {
            eyre::bail!("worker.max-error-length must be > 0");
        }
        JobType::parse_list(&self.worker.job_types).context("worker.job-types is invalid")?;
        if self.scraper.permalink_command.is_empty() || self.scraper.scraper_command.is_empty() {
            eyre::bail!("scraper commands must not be empty");
        }
        Ok(())
    }

    pub fn scorer_settings(&self) -> ScorerSettings {
        ScorerSettings {
            batch_size: self.scoring.batch_size,
            ensemble_runs: self.scoring.ensemble_runs,
            ensemble_temperature: self.scoring.ensemble_temperature,
            temperature: self.scoring.temperature,
            max_tokens_per_post: self.llm.max_tokens_per_post,
            parse_attempts: self.scoring.parse_attempts,
            backoff: BackoffPolicy {
                max_attempts: self.scoring.api_attempts,
                min_delay: Duration::from_millis(self.scoring.backoff_min_ms),
                max_delay: Duration::from_millis(self.scoring.backoff_max_ms),
            },
            model: Some(self.llm.model.clone()),
        }
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig::with_model(&self.llm.model)
            .with_timeout(Duration::from_millis(self.llm.timeout_ms))
    }

    /// Poll settings; `job_types` overrides the configured filter
    pub fn poll_config(
        &self,
        job_types: Vec<JobType>,
        poll_interval_secs: Option<u64>,
    ) -> PollConfig {
        let poll_interval_secs = poll_interval_secs.unwrap_or(self.worker.poll_interval_secs);
        PollConfig {
            job_types,
            poll_interval: Duration::from_secs(poll_interval_secs),
            recompute_batch_size: self.worker.recompute_batch_size,
            cancel_check_interval: self.worker.cancel_check_interval,
            progress_interval: self.worker.progress_interval,
            backfill_batch_size: self.worker.backfill_batch_size,
            heartbeat_interval: Duration::from_secs(self.worker.heartbeat_interval_secs),
            max_error_length: self.worker.max_error_length,
        }
    }

    pub fn delegation(&self) -> DelegationConfig {
        DelegationConfig {
            permalink_command: self.scraper.permalink_command.clone(),
            scraper_command: self.scraper.scraper_command.clone(),
            working_dir: self.scraper.working_dir.clone(),
            permalink_timeout: Duration::from_secs(self.scraper.permalink_timeout_secs),
            scraper_timeout: Duration::from_secs(self.scraper.scraper_timeout_secs),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("postrank")
                .join("postrank.db"),
        }
    }
}

/// Model API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    /// Output token budget per post in a batch.
    #[serde(rename = "max-tokens-per-post")]
    pub max_tokens_per_post: u32,

    /// HTTP timeout per call in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Environment variable holding the API key.
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: postrank::llm::anthropic::DEFAULT_MODEL.to_string(),
            max_tokens_per_post: 500,
            timeout_ms: 120_000,
            api_key_env: postrank::llm::anthropic::API_KEY_ENV.to_string(),
        }
    }
}

/// Scorer tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Posts per model call.
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Runs per batch; 1 disables ensemble scoring.
    #[serde(rename = "ensemble-runs")]
    pub ensemble_runs: usize,

    #[serde(rename = "ensemble-temperature")]
    pub ensemble_temperature: f32,

    pub temperature: f32,

    /// Attempts per call including JSON correction turns.
    #[serde(rename = "parse-attempts")]
    pub parse_attempts: u32,

    /// Attempts per call for retryable API errors.
    #[serde(rename = "api-attempts")]
    pub api_attempts: u32,

    #[serde(rename = "backoff-min-ms")]
    pub backoff_min_ms: u64,

    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            ensemble_runs: 3,
            ensemble_temperature: 0.7,
            temperature: 0.3,
            parse_attempts: 3,
            api_attempts: 3,
            backoff_min_ms: 2_000,
            backoff_max_ms: 10_000,
        }
    }
}

/// Job worker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Comma-separated job types to claim.
    #[serde(rename = "job-types")]
    pub job_types: String,

    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    #[serde(rename = "recompute-batch-size")]
    pub recompute_batch_size: usize,

    #[serde(rename = "cancel-check-interval")]
    pub cancel_check_interval: usize,

    #[serde(rename = "progress-interval")]
    pub progress_interval: usize,

    #[serde(rename = "backfill-batch-size")]
    pub backfill_batch_size: usize,

    #[serde(rename = "heartbeat-interval-secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(rename = "max-error-length")]
    pub max_error_length: usize,

    /// Retries given to jobs created from the CLI.
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_types: JobType::RecomputeFinalScores.as_str().to_string(),
            poll_interval_secs: 30,
            recompute_batch_size: 500,
            cancel_check_interval: 5,
            progress_interval: 5,
            backfill_batch_size: 20,
            heartbeat_interval_secs: 60,
            max_error_length: 1000,
            max_retries: 3,
        }
    }
}

/// Delegated scraper commands.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Permalink scraper command line.
    #[serde(rename = "permalink-command")]
    pub permalink_command: Vec<String>,

    /// Feed scraper command line.
    #[serde(rename = "scraper-command")]
    pub scraper_command: Vec<String>,

    #[serde(rename = "working-dir")]
    pub working_dir: Option<PathBuf>,

    #[serde(rename = "permalink-timeout-secs")]
    pub permalink_timeout_secs: u64,

    #[serde(rename = "scraper-timeout-secs")]
    pub scraper_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        let delegation = DelegationConfig::default();
        Self {
            permalink_command: delegation.permalink_command,
            scraper_command: delegation.scraper_command,
            working_dir: delegation.working_dir,
            permalink_timeout_secs: delegation.permalink_timeout.as_secs(),
            scraper_timeout_secs: delegation.scraper_timeout.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scoring.batch_size, 5);
        assert_eq!(config.scoring.ensemble_runs, 3);
        assert_eq!(config.worker.recompute_batch_size, 500);
        assert_eq!(config.worker.max_error_length, 1000);
        assert_eq!(config.scraper.scraper_timeout_secs, 7200);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = Config {
            scoring: ScoringConfig {
                batch_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            worker: WorkerConfig {
                job_types: "recompute_final_scores,nonsense".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            scraper: ScraperConfig {
                scraper_command: vec![],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
database:
  path: /tmp/postrank-test.db
scoring:
  ensemble-runs: 1
  batch-size: 10
worker:
  job-types: recompute_final_scores,backfill_dimension
  poll-interval-secs: 5
log-file: /tmp/postrank.log
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/postrank-test.db"));
        assert_eq!(config.scoring.ensemble_runs, 1);
        assert_eq!(config.scoring.batch_size, 10);
        assert_eq!(config.worker.poll_interval_secs, 5);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/postrank.log")));
        // Other fields should have defaults
        assert_eq!(config.scoring.parse_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();

        let settings = config.scorer_settings();
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.backoff.max_attempts, 3);
        assert_eq!(settings.backoff.min_delay, Duration::from_secs(2));
        assert_eq!(settings.model.as_deref(), Some(config.llm.model.as_str()));

        let poll = config.poll_config(vec![JobType::RunScraper], Some(7));
        assert_eq!(poll.poll_interval, Duration::from_secs(7));
        assert_eq!(poll.job_types, vec![JobType::RunScraper]);
        assert_eq!(poll.recompute_batch_size, 500);

        let delegation = config.delegation();
        assert_eq!(delegation, DelegationConfig::default());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "worker:\n  max-retries: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.worker.max_retries, 7);

        let missing = dir.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
