//! jobwatch CLI
//!
//! Scheduled entry point: run it from cron or a systemd timer every
//! `schedule.frequency_hours`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use jobwatch::{
    config::{CONFIG_FILE, RULESET_FILE, load_all},
    error::{AppError, Result},
    models::{Config, RuleSet, RunReport, RunStatus},
    pipeline::{self, RunOptions, Stage},
    storage::{Artifact, ArtifactStorage, LocalStorage, RunLock},
    utils::console,
};

/// jobwatch - remote data/AI job postings, scored and notified once
#[derive(Parser, Debug)]
#[command(name = "jobwatch", version, about = "Job posting watcher")]
struct Cli {
    /// Storage directory holding config, ruleset, state and run artifacts
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, normalize, score, dedup and notify
    Run {
        /// Score and record sightings without delivering anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-run from a previous run's artifacts
    Replay {
        /// Stage to start from: score (normalized.json) or notify (scored.json)
        #[arg(long)]
        stage: Stage,

        /// Run to replay; defaults to the latest run with the needed artifact
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Validate config.toml and ruleset.toml
    Validate,

    /// Show storage, lock and last run info
    Info,

    /// Remove a lock left behind by a crashed run
    Unlock,
}

/// Initialize logging based on verbosity flag, falling back to the
/// configured level.
fn init_logging(verbose: bool, storage_dir: &Path) {
    let level = if verbose {
        "debug".to_string()
    } else {
        Config::load(storage_dir.join(CONFIG_FILE))
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_report(report: &RunReport) {
    for line in console::summary_lines("Run report", &report.summary_items()) {
        println!("{line}");
    }
    for error in &report.errors {
        println!("    ! {error}");
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, &cli.storage_dir);

    let storage_dir = &cli.storage_dir;

    match cli.command {
        Command::Run { dry_run } => finish(
            pipeline::run_pipeline(storage_dir, &RunOptions::full(dry_run)).await,
            storage_dir,
        )
        .await?,

        Command::Replay {
            stage,
            run_id,
            dry_run,
        } => {
            if stage == Stage::Fetch {
                return Err(AppError::config(
                    "replay starts from score or notify; use `run` to fetch",
                ));
            }
            finish(
                pipeline::run_pipeline(storage_dir, &RunOptions::replay(stage, run_id, dry_run))
                    .await,
                storage_dir,
            )
            .await?
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            let (config, rules) = load_all(storage_dir)?;
            log::info!(
                "✓ {} OK ({} enabled sources, channel {:?})",
                CONFIG_FILE,
                config.enabled_sources().count(),
                config.notifier.channel
            );
            log::info!(
                "✓ {} OK (version {}, {} roles, {} stack terms, threshold {})",
                RULESET_FILE,
                rules.ruleset_version(),
                rules.roles.len(),
                rules.stack.len(),
                rules.min_score_threshold
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            let config = Config::load_or_default(storage_dir.join(CONFIG_FILE));
            let rules = RuleSet::load_or_default(storage_dir.join(RULESET_FILE));
            let storage = LocalStorage::new(storage_dir);

            console::header("jobwatch");
            log::info!("Storage directory: {}", storage_dir.display());
            log::info!("Ruleset: {}", rules.ruleset_version());
            log::info!(
                "Sources: {}",
                config
                    .enabled_sources()
                    .map(|s| s.id())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            match RunLock::inspect(storage_dir) {
                Some(lock) => log::info!(
                    "Lock: held by {} (pid {}) since {}",
                    lock.holder,
                    lock.pid,
                    lock.acquired_at
                ),
                None => log::info!("Lock: free"),
            }

            match storage.latest_run_with(Artifact::Report).await? {
                Some(run_id) => {
                    if let Some(report) = storage.read_report(&run_id).await? {
                        print_report(&report);
                    }
                }
                None => log::info!("No runs yet."),
            }
        }

        Command::Unlock => {
            if RunLock::force_unlock(storage_dir)? {
                log::info!("Removed run lock in {}", storage_dir.display());
            } else {
                log::info!("No run lock in {}", storage_dir.display());
            }
        }
    }

    Ok(())
}

/// Print the report of a finished run, including a failed one.
async fn finish(result: Result<RunReport>, storage_dir: &Path) -> Result<()> {
    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            let storage = LocalStorage::new(storage_dir);
            if !matches!(e, AppError::RunLocked { .. } | AppError::Config(_))
                && let Ok(Some(run_id)) = storage.latest_run_with(Artifact::Report).await
                && let Ok(Some(report)) = storage.read_report(&run_id).await
                && report.status != RunStatus::Succeeded
            {
                print_report(&report);
            }
            log::error!("Run failed: {}", e);
            Err(e)
        }
    }
}
