//! tunersched: tuner scheduling and conflict-resolution daemon.
//!
//! Periodically expands schedules and rules into recording occurrences,
//! assigns them to tuner cards and persists the resulting conflict set.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

mod config;
mod database;
mod engine;
mod logging;
mod notify;
mod provider;
mod scheduler;

use config::ConfigFile;
use database::{Database, DatabaseHandle};
use notify::Notifier;
use provider::{Backend, SqliteBackend};
use scheduler::{PeriodicEvaluator, RuleRegistry};

const DEFAULT_DATABASE: &str = "tunersched.db";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

/// How long a stopping evaluator may take to finish its pass.
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// tunersched - Tuner scheduling and conflict-resolution daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the database file [default: tunersched.db]
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored [default: logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files [default: 7]
    #[arg(long)]
    log_retention_days: Option<u64>,

    /// Evaluation check interval in seconds
    #[arg(long)]
    check_interval: Option<u64>,

    /// Run a single full evaluation and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_config = match config::config_path(args.config.clone()) {
        Some(path) => match config::load_config(&path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    // Command line takes precedence over the file
    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_deref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let log_retention_days = args
        .log_retention_days
        .or(file_config.logging.retention_days)
        .unwrap_or(DEFAULT_LOG_RETENTION_DAYS);

    logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    let db_path = args
        .database
        .clone()
        .or_else(|| file_config.database.path.as_deref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

    let mut evaluator_config = file_config.evaluator;
    if let Some(secs) = args.check_interval {
        evaluator_config.check_interval_secs = secs;
    }

    info!("Opening database: {:?}", db_path);
    let db: DatabaseHandle = match Database::open(&db_path) {
        Ok(db) => db.into_handle(),
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let backend = Backend::from_shared(Arc::new(SqliteBackend::new(db)));
    let registry = Arc::new(RuleRegistry::new(Arc::clone(&backend.rules)));

    info!("tunersched starting...");
    info!("  Database: {:?}", db_path);
    info!("  Lookahead: {} days", evaluator_config.lookahead_days);
    info!(
        "  Checks: every {}s (full every {}s, pre-check every {}s)",
        evaluator_config.check_interval_secs,
        evaluator_config.full_check_interval_secs,
        evaluator_config.pre_check_interval_secs
    );
    info!(
        "  Moved program detection: {}, episode management: {:?}",
        evaluator_config.detect_moved_programs, evaluator_config.episode_management
    );

    let evaluator = Arc::new(PeriodicEvaluator::new(
        backend,
        registry,
        Notifier::default(),
        evaluator_config,
    ));

    if args.once {
        let outcome = evaluator.evaluate_now().await;
        info!(
            "Evaluation finished: {} assigned, {} conflict(s), {} schedule(s) created",
            outcome.assigned.len(),
            outcome.conflicts.len(),
            outcome.created_schedules.len()
        );
        for conflict in &outcome.conflicts {
            info!(
                "  Conflict: schedule {} at {} (card {:?}, held by {:?})",
                conflict.schedule_id,
                conflict.program_start_time,
                conflict.card_id,
                conflict.conflicting_schedule_id
            );
        }
        return Ok(());
    }

    let mut handle = Arc::clone(&evaluator).start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    evaluator.stop().await;

    let grace = std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS);
    if tokio::time::timeout(grace, &mut handle).await.is_err() {
        warn!("Evaluator did not stop within {}s, aborting", SHUTDOWN_GRACE_SECS);
        handle.abort();
    }

    Ok(())
}
