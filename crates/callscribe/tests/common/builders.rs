//! Builders for test configurations and catalog rows.

#![allow(dead_code)]

use std::path::Path;

use chrono::{Duration, Utc};

use callscribe::catalog::{NewRecording, RecordingStatus};
use callscribe::db::recording_repo;
use callscribe::{Config, Database};

/// Builder for `Config` instances rooted at a test folder.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(calls_dir: &Path) -> Self {
        let mut config = Config::default();
        config.calls_dir = calls_dir.to_string_lossy().into_owned();
        config.worker.heartbeat_interval_secs = 1;
        config.watcher.stable_seconds = 10;
        Self { config }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.worker.max_retries = n;
        self
    }

    pub fn admission_ceiling(mut self, n: usize) -> Self {
        self.config.dispatcher.admission_ceiling = n;
        self
    }

    pub fn stuck_threshold_secs(mut self, secs: u64) -> Self {
        self.config.dispatcher.stuck_threshold_secs = secs;
        self
    }

    pub fn diarization(mut self, enabled: bool) -> Self {
        self.config.diarization.enabled = enabled;
        self
    }

    pub fn sync_from(mut self, source_dir: &Path, batch_size: usize) -> Self {
        self.config.watcher.sync.enabled = true;
        self.config.watcher.sync.source_dir = Some(source_dir.to_string_lossy().into_owned());
        self.config.watcher.sync.batch_size = batch_size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Builder for recordings inserted directly into the catalog.
pub struct RecordingBuilder {
    hash: String,
    file_name: String,
    status: RecordingStatus,
    retry_count: u32,
    stale_secs: Option<i64>,
    step: Option<(String, Option<u32>)>,
}

impl RecordingBuilder {
    pub fn new(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            file_name: format!("{hash}.m4a"),
            status: RecordingStatus::Queued,
            retry_count: 0,
            stale_secs: None,
            step: None,
        }
    }

    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn status(mut self, status: RecordingStatus) -> Self {
        self.status = status;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    /// Back-dates `updated_at` by `secs`.
    pub fn stale_for(mut self, secs: i64) -> Self {
        self.stale_secs = Some(secs);
        self
    }

    pub fn at_step(mut self, step: &str, segments: Option<u32>) -> Self {
        self.step = Some((step.to_string(), segments));
        self
    }

    /// Inserts the row and returns its id.
    pub fn insert(self, db: &Database) -> String {
        let new = NewRecording::new(
            &self.hash,
            &format!("/calls/{}", self.file_name),
            &self.file_name,
            1024,
        );
        recording_repo::insert(db, &new, self.status).unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE recordings SET retry_count = ?2 WHERE id = ?1",
                rusqlite::params![new.id, self.retry_count],
            )?;
            if let Some((step, segments)) = &self.step {
                conn.execute(
                    "UPDATE recordings SET processing_step = ?2, processing_segments_count = ?3
                     WHERE id = ?1",
                    rusqlite::params![new.id, step, segments],
                )?;
            }
            Ok(())
        })
        .unwrap();

        if let Some(secs) = self.stale_secs {
            recording_repo::set_updated_at(db, &new.id, Utc::now() - Duration::seconds(secs))
                .unwrap();
        }
        new.id
    }
}
