//! Polls a watch folder and queues files once they stop changing.

pub mod stability;
pub mod sync;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::db::{recording_repo, Database};
use crate::dispatcher::sleep_unless;
use crate::error::WatchError;
use crate::ingest::hashing::{file_name, hash_candidates};
use crate::ingest::{AudioScanner, Ingestor, ReconcileOptions};

pub use stability::StabilityTracker;
pub use sync::SourceSync;

/// Counts of one poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollReport {
    pub scanned: usize,
    pub ready: usize,
    pub queued: usize,
    pub skipped: usize,
    pub synced: usize,
}

pub struct Watcher {
    db: Database,
    ingestor: Ingestor,
    scanner: AudioScanner,
    tracker: StabilityTracker,
    sync: Option<SourceSync>,
    poll_interval: Duration,
}

impl Watcher {
    pub fn new(db: Database, config: &Config) -> Self {
        let watch_dir = config.watch_dir();
        let extensions = config.extensions();
        let sync = match (&config.watcher.sync.enabled, &config.watcher.sync.source_dir) {
            (true, Some(source)) => Some(SourceSync::new(
                Path::new(source),
                &watch_dir,
                &extensions,
                config.watcher.sync.batch_size,
            )),
            _ => None,
        };

        Self {
            ingestor: Ingestor::new(db.clone(), config),
            scanner: AudioScanner::new(&watch_dir, &extensions).top_level_only(),
            tracker: StabilityTracker::new(Duration::from_secs(config.watcher.stable_seconds)),
            sync,
            poll_interval: Duration::from_secs(config.watcher.poll_interval_secs),
            db,
        }
    }

    pub fn watch_dir(&self) -> &Path {
        self.scanner.root()
    }

    pub fn poll_once(&mut self) -> Result<PollReport, WatchError> {
        self.poll_once_at(SystemTime::now())
    }

    /// One poll with `now` as the mtime reference.
    pub fn poll_once_at(&mut self, now: SystemTime) -> Result<PollReport, WatchError> {
        let mut report = PollReport::default();

        if let Some(sync) = &self.sync {
            let backlog = self.backlog()?;
            if backlog < sync.batch_size() {
                report.synced = match sync.pull(&self.db) {
                    Ok(copied) => copied,
                    Err(e) => {
                        warn!("Source sync failed: {}", e);
                        0
                    }
                };
            } else {
                debug!("Backlog of {} files; sync paused", backlog);
            }
        }

        let files = self.scan()?;
        report.scanned = files.len();

        let present: HashSet<PathBuf> = files.iter().cloned().collect();
        self.tracker.prune(&present);

        let ready: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| self.tracker.observe(path, now))
            .collect();
        report.ready = ready.len();

        if !ready.is_empty() {
            let ingest = self.ingestor.ingest_paths(&ready, ReconcileOptions::watcher());
            for e in &ingest.errors {
                warn!("Watcher ingest: {}", e);
            }
            report.queued = ingest.queued;
        }
        report.skipped = report.ready.saturating_sub(report.queued);

        if report.queued > 0 || report.synced > 0 {
            info!(
                "Watcher poll: scanned={}, ready={}, queued={}, skipped={}, synced={}",
                report.scanned, report.ready, report.queued, report.skipped, report.synced
            );
        }
        Ok(report)
    }

    /// Polls every `poll_interval` until `shutdown` is set.
    pub fn start(&mut self, shutdown: &AtomicBool) {
        info!(
            "Watching {} every {:?}",
            self.watch_dir().display(),
            self.poll_interval
        );
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.poll_once() {
                error!("Watcher poll failed: {}", e);
            }
            sleep_unless(shutdown, self.poll_interval);
        }
        info!("Watcher stopped");
    }

    fn scan(&self) -> Result<Vec<PathBuf>, WatchError> {
        self.scanner.scan().map_err(|source| WatchError::Scan {
            path: self.scanner.root().to_path_buf(),
            source,
        })
    }

    /// Watch-folder files the catalog knows neither by name nor by hash.
    fn backlog(&self) -> Result<usize, WatchError> {
        let files = self.scan()?;
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        let known_names = recording_repo::existing_file_names(&self.db, &names)?;

        let unknown: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| !known_names.contains(&file_name(p)))
            .collect();
        if unknown.is_empty() {
            return Ok(0);
        }

        let (candidates, _) = hash_candidates(&unknown);
        let hashes: Vec<String> = candidates.iter().map(|c| c.hash.clone()).collect();
        let known_hashes = recording_repo::find_by_hashes(&self.db, &hashes)?;
        Ok(candidates
            .iter()
            .filter(|c| !known_hashes.contains_key(&c.hash))
            .count())
    }
}
