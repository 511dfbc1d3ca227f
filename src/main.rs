use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

use postrank::daemon::{JobOutcome, Orchestrator};
use postrank::domain::{BackgroundJob, JobParams, JobStatus, JobType};
use postrank::llm::{AnthropicClient, LlmClient};
use postrank::scoring::LlmScorer;
use postrank::store::{JobStore, SqliteStore};

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if cli.is_verbose() {
        builder.filter_level(log::LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }

    if let Some(log_file) = &config.log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.init();
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database.path)
        .context(format!("Failed to open database {}", config.database.path.display()))?;
    info!("Using database {}", config.database.path.display());
    Ok(Arc::new(store))
}

fn anthropic_client(config: &Config) -> Result<Arc<AnthropicClient>> {
    let api_key = std::env::var(&config.llm.api_key_env)
        .context(format!("{} is not set", config.llm.api_key_env))?;
    let client = AnthropicClient::with_api_key(api_key, config.anthropic_config())?;
    Ok(Arc::new(client))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Commands::Worker {
            job_type,
            poll_interval,
            once,
        } => handle_worker_command(job_type.as_deref(), *poll_interval, *once, config).await,
        Commands::Score { limit } => handle_score_command(*limit, config).await,
        Commands::Enqueue {
            job_type,
            params,
            max_retries,
        } => handle_enqueue_command(job_type, params, *max_retries, config),
        Commands::Cancel { id } => handle_cancel_command(id, config),
        Commands::Jobs { status, limit } => handle_jobs_command(status.as_deref(), *limit, config),
        Commands::RecountTopics { window_days } => handle_recount_command(*window_days, config),
    }
}

async fn handle_worker_command(
    job_type: Option<&str>,
    poll_interval: Option<u64>,
    once: bool,
    config: &Config,
) -> Result<()> {
    let job_types = JobType::parse_list(job_type.unwrap_or(&config.worker.job_types))?;
    let store = open_store(config)?;
    let mut orchestrator = Orchestrator::new(
        store.clone(),
        config.poll_config(job_types.clone(), poll_interval),
        config.delegation(),
    );

    if job_types.contains(&JobType::BackfillDimension) {
        let client: Arc<dyn LlmClient> = anthropic_client(config)?;
        let scorer = LlmScorer::new(client, store, config.scorer_settings());
        orchestrator = orchestrator.with_scorer(Arc::new(scorer));
    }

    let names: Vec<&str> = job_types.iter().map(|t| t.as_str()).collect();
    println!("{} {}", "Worker claiming:".cyan(), names.join(", "));

    if once {
        match orchestrator.run_once().await? {
            Some(outcome) => print_outcome(&outcome),
            None => println!("{}", "No pending jobs".yellow()),
        }
        return Ok(());
    }

    orchestrator.run().await?;
    let stats = orchestrator.stats();
    println!(
        "{} {} completed, {} failed, {} retried, {} cancelled",
        "Worker stopped:".cyan(),
        stats.completed,
        stats.failed,
        stats.retried,
        stats.cancelled
    );
    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed => println!("{}", "Job completed".green()),
        JobOutcome::Cancelled => println!("{}", "Job cancelled".yellow()),
        JobOutcome::Retried { retry_count } => {
            println!("{} (retry {})", "Job requeued".yellow(), retry_count)
        }
        JobOutcome::Failed { message } => println!("{} {}", "Job failed:".red(), message),
    }
}

async fn handle_score_command(limit: usize, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let client = anthropic_client(config)?;
    let scorer = LlmScorer::new(client.clone(), store, config.scorer_settings());

    info!("Scoring up to {} unscored posts", limit);
    let stats = scorer.score_unscored(limit).await?;

    let usage = client.total_usage();
    println!(
        "{} {} saved, {} skipped, {} errors",
        "Scored:".green(),
        stats.saved,
        stats.skipped,
        stats.errors
    );
    println!(
        "  tokens: {} in / {} out, cost ${:.4}",
        usage.input_tokens,
        usage.output_tokens,
        usage.cost_usd(&config.llm.model)
    );
    Ok(())
}

fn handle_enqueue_command(
    job_type: &str,
    params: &str,
    max_retries: Option<u32>,
    config: &Config,
) -> Result<()> {
    let job_type: JobType = job_type.parse().map_err(|e: String| eyre::eyre!(e))?;
    let params: serde_json::Value =
        serde_json::from_str(params).context("--params is not valid JSON")?;
    JobParams::parse(job_type, &params)?;

    let store = open_store(config)?;
    let max_retries = max_retries.unwrap_or(config.worker.max_retries);
    let job = store.create_job(job_type, &params, max_retries)?;
    info!("Enqueued job {} ({})", job.id, job.job_type);
    println!("{} {} ({})", "Enqueued:".green(), job.id, job.job_type);
    Ok(())
}

fn handle_cancel_command(id: &str, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    if store.cancel_job(id)? {
        println!("{} {}", "Cancelled:".yellow(), id);
    } else {
        let status = store.job_status(id)?;
        println!("{} {} is already {}", "Not cancelled:".red(), id, status);
    }
    Ok(())
}

fn handle_jobs_command(status: Option<&str>, limit: usize, config: &Config) -> Result<()> {
    let status = status
        .map(|s| s.parse::<JobStatus>().map_err(|e| eyre::eyre!(e)))
        .transpose()?;
    let store = open_store(config)?;
    let jobs = store.list_jobs(status, limit)?;

    if jobs.is_empty() {
        println!("{}", "No jobs".yellow());
        return Ok(());
    }
    for job in &jobs {
        print_job(job);
    }
    Ok(())
}

fn print_job(job: &BackgroundJob) {
    let status = match job.status {
        JobStatus::Pending => job.status.as_str().normal(),
        JobStatus::Running => job.status.as_str().cyan(),
        JobStatus::Completed => job.status.as_str().green(),
        JobStatus::Error => job.status.as_str().red(),
        JobStatus::Cancelled => job.status.as_str().yellow(),
    };
    let progress = match job.total {
        Some(total) => format!("{}/{}", job.progress, total),
        None => job.progress.to_string(),
    };
    println!(
        "{}  {:<22} {:<10} {:>11}  retries {}/{}  {}",
        job.id,
        job.job_type.as_str(),
        status,
        progress,
        job.retry_count,
        job.max_retries,
        job.created_at
    );
    if let Some(message) = &job.error_message {
        println!("    {}", message.dimmed());
    }
}

fn handle_recount_command(window_days: Option<u32>, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let window_days = match window_days {
        Some(days) => days,
        None => store.novelty_config()?.window_days,
    };
    let categories = store.recount_topic_frequencies(window_days)?;
    println!(
        "{} {} categories over the last {} days",
        "Recounted:".green(),
        categories,
        window_days
    );
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config =
        config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    // Run the main application logic
    runtime
        .block_on(run_application(&cli, &config))
        .context("Application failed")?;

    Ok(())
}
