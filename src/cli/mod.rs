//! Command-line interface for podsync.
//!
//! Provides commands for sweeping the feed, polling on a schedule,
//! inspecting the episode ledger, and retrying failed episodes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::{Orchestrator, SyncOptions};

/// podsync - Podcast episode ingestion and enrichment pipeline
#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (default: podsync.yaml, or $PODSYNC_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweep the feed once and process unpublished episodes
    Sync {
        /// Run the pipeline through validation without writing anywhere
        #[arg(long)]
        dry_run: bool,

        /// Reprocess episodes already marked completed
        #[arg(long)]
        force: bool,

        /// Override the configured retry ceiling
        #[arg(long)]
        max_retries: Option<u32>,

        /// Maximum episodes to process this run
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only episodes published on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Only episodes published on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Poll the feed on the configured schedule until a sync succeeds
    Watch,

    /// Show the episode ledger summary
    Status,

    /// Re-drive episodes the ledger lists as failed or stuck
    Retry {
        /// Override the configured retry ceiling
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config)?;

        match self.command {
            Commands::Sync {
                dry_run,
                force,
                max_retries,
                batch_size,
                from,
                to,
            } => {
                let options = SyncOptions {
                    dry_run,
                    force,
                    max_retries,
                    batch_size,
                    from: from.as_deref().map(parse_day_start).transpose()?,
                    to: to.as_deref().map(parse_day_end).transpose()?,
                };
                run_sync(&config, options).await
            }
            Commands::Watch => run_watch(&config).await,
            Commands::Status => show_status(&config).await,
            Commands::Retry { max_retries } => run_retry(&config, max_retries).await,
        }
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = Config::resolve_path(explicit);
    Config::load(&path)
}

async fn run_sync(config: &Config, options: SyncOptions) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let report = orchestrator.sync(&options).await?;

    println!(
        "Sweep finished: {} discovered, {} completed, {} skipped, {} failed",
        report.discovered, report.completed, report.skipped, report.failed
    );
    if report.failed > 0 {
        return Err(anyhow!("{} episode(s) failed; see log", report.failed));
    }
    Ok(())
}

/// Wait until the configured start instant, then poll the feed at the
/// configured interval. Exits after the first sweep that publishes
/// something.
async fn run_watch(config: &Config) -> Result<()> {
    if let Some(ref start) = config.schedule.start_datetime {
        let start_utc = parse_scheduled_start(start, config.schedule.timezone_offset)?;
        let now = Utc::now();
        if now < start_utc {
            info!(start = %start_utc, "Waiting until the scheduled start");
            tokio::time::sleep((start_utc - now).to_std().unwrap_or(Duration::ZERO)).await;
        } else {
            info!(start = %start_utc, "Scheduled start already passed, polling immediately");
        }
    }

    let orchestrator = Orchestrator::from_config(config).await?;
    let interval = Duration::from_secs(config.schedule.interval_minutes * 60);
    let options = SyncOptions::default();

    loop {
        match orchestrator.sync(&options).await {
            Ok(report) if report.completed > 0 => {
                println!("Published {} new episode(s)", report.completed);
                return Ok(());
            }
            Ok(report) => {
                info!(
                    skipped = report.skipped,
                    failed = report.failed,
                    "No new episodes published this sweep"
                );
            }
            Err(e) => {
                warn!(error = %e, "Sweep failed, will retry at next interval");
            }
        }
        tokio::time::sleep(interval).await;
    }
}

async fn show_status(config: &Config) -> Result<()> {
    let ledger = crate::ledger::Ledger::open(config.ledger_path()?)
        .await
        .context("Failed to open episode ledger")?;
    let summary = ledger.status_summary().await?;

    println!("Episode ledger: {}", ledger.path().display());
    println!("  completed:   {}", summary.completed);
    println!("  in progress: {}", summary.in_progress);
    println!("  failed:      {}", summary.failed);
    println!("  pending:     {}", summary.pending);
    println!("  total:       {}", summary.total());

    let incomplete = ledger.list_incomplete().await?;
    if !incomplete.is_empty() {
        println!("\nIncomplete episodes:");
        for record in incomplete {
            let error = record.last_error_kind.as_deref().unwrap_or("-");
            println!(
                "  {}  status={:?}  attempts={}  last_error={}",
                record.episode_id, record.status, record.attempts, error
            );
        }
    }
    Ok(())
}

async fn run_retry(config: &Config, max_retries: Option<u32>) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let options = SyncOptions {
        max_retries,
        ..SyncOptions::default()
    };
    let report = orchestrator.retry_incomplete(&options).await?;

    println!(
        "Retry finished: {} attempted, {} completed, {} failed",
        report.discovered, report.completed, report.failed
    );
    Ok(())
}

/// Parse a `YYYY-MM-DD` flag to the start of that UTC day.
fn parse_day_start(date: &str) -> Result<DateTime<Utc>> {
    Ok(parse_date(date)?.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Parse a `YYYY-MM-DD` flag to the end of that UTC day.
fn parse_day_end(date: &str) -> Result<DateTime<Utc>> {
    let day = parse_date(date)?;
    let end = day
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN));
    Ok(end.and_utc())
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))
}

/// Resolve "YYYY-MM-DD HH:MM:SS" in the configured UTC offset to an
/// instant.
fn parse_scheduled_start(start: &str, timezone_offset: i32) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("Invalid schedule.start_datetime '{start}'"))?;
    let offset = FixedOffset::east_opt(timezone_offset * 3600)
        .ok_or_else(|| anyhow!("Invalid schedule.timezone_offset {timezone_offset}"))?;
    let local = naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| anyhow!("Ambiguous schedule.start_datetime '{start}'"))?;
    Ok(local.with_timezone(&Utc))
}
