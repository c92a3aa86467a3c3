use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use callscribe::db::recording_repo::RecordingFilter;
use callscribe::logging::{self, LogFormat};
use callscribe::{
    engines, load_or_default, Config, Control, Database, Dispatcher, ExecutionRuntime, Ingestor,
    RecordingStatus, RecordingWorker, Watcher, WorkerPool,
};

#[derive(Parser)]
#[command(name = "callscribe", version, about = "Call recording ingestion and transcription")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, env = "CALLSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue every audio file below a folder
    Ingest {
        folder: PathBuf,
        /// Requeue files that were already processed
        #[arg(long)]
        force: bool,
    },
    /// Move a recording back to the queue
    Reprocess { id: String },
    /// Show queue load
    Status {
        #[arg(long)]
        threshold: Option<u64>,
    },
    /// Show one recording with its transcript and enrichment
    Show { id: String },
    /// List recordings
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Poll the watch folder once
    WatchOnce,
    /// Run workers, the dispatcher and the watcher until interrupted
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(
        cli.log_format
            .or_else(LogFormat::from_env)
            .unwrap_or_default(),
    );

    let config = load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let db_path = config
        .database_path()
        .ok_or_else(|| anyhow!("No database path configured and no home directory found"))?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open catalog at {}", db_path.display()))?;

    let control = Control::new(db.clone(), Ingestor::new(db.clone(), &config));

    match cli.command {
        Command::Ingest { folder, force } => print_json(&control.submit_for_ingestion(&folder, force)?),
        Command::Reprocess { id } => {
            let from = control.reprocess(&id)?;
            println!("Recording {} requeued (was {})", id, from);
            Ok(())
        }
        Command::Status { threshold } => {
            print_json(&control.queue_status(threshold.unwrap_or(config.queue_status_threshold))?)
        }
        Command::Show { id } => print_json(&control.get_recording(&id)?),
        Command::List {
            status,
            name,
            limit,
            offset,
        } => {
            let status = status
                .map(|s| s.parse::<RecordingStatus>())
                .transpose()?;
            let filter = RecordingFilter {
                status,
                file_name_contains: name,
                limit: Some(limit),
                offset: Some(offset),
            };
            print_json(&control.list_recordings(&filter)?)
        }
        Command::WatchOnce => {
            let mut watcher = Watcher::new(db, &config);
            print_json(&watcher.poll_once()?)
        }
        Command::Run => run(db, &config),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(db: Database, config: &Config) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    let engines = engines::shared(&config.engines);
    let worker = Arc::new(RecordingWorker::new(db.clone(), engines, config));
    let pool = Arc::new(WorkerPool::new(
        worker,
        config.worker.concurrency,
        config.dispatcher.admission_ceiling,
        config.worker.task_timeout(),
    ));

    let watcher_thread = if config.watcher.enabled {
        let mut watcher = Watcher::new(db.clone(), config);
        let shutdown = Arc::clone(&shutdown);
        Some(thread::spawn(move || watcher.start(&shutdown)))
    } else {
        None
    };

    let runtime: Arc<dyn ExecutionRuntime> = pool.clone();
    Dispatcher::new(db, runtime, config).start(&shutdown);

    if let Some(handle) = watcher_thread {
        if handle.join().is_err() {
            warn!("Watcher thread panicked");
        }
    }

    pool.shutdown();
    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.wait(),
        Err(_) => warn!("Worker pool still referenced; not waiting for workers"),
    }
    Ok(())
}
