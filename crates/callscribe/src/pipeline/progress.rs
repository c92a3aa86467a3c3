use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;

use super::error::Stage;
use crate::db::{recording_repo, Database};

/// Receives pipeline progress as it happens.
pub trait ProgressReporter: Send + Sync {
    fn stage_started(&self, stage: Stage);

    /// Running count of transcribed segments.
    fn segments(&self, count: u32);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn stage_started(&self, _stage: Stage) {}

    fn segments(&self, _count: u32) {}
}

/// Persists progress onto the recording row so observers can follow a job.
/// Segment counts are written on every `persist_every`-th update.
pub struct CatalogProgress {
    db: Database,
    recording_id: String,
    persist_every: u32,
    updates: AtomicU32,
}

impl CatalogProgress {
    pub fn new(db: Database, recording_id: &str, persist_every: u32) -> Self {
        Self {
            db,
            recording_id: recording_id.to_string(),
            persist_every: persist_every.max(1),
            updates: AtomicU32::new(0),
        }
    }
}

impl ProgressReporter for CatalogProgress {
    fn stage_started(&self, stage: Stage) {
        match recording_repo::set_step(&self.db, &self.recording_id, stage.as_str()) {
            Ok(true) => {}
            Ok(false) => warn!(
                "Recording {} is no longer processing at step {}",
                self.recording_id, stage
            ),
            Err(e) => warn!("Failed to persist step {} for {}: {}", stage, self.recording_id, e),
        }
    }

    fn segments(&self, count: u32) {
        let n = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.persist_every != 0 {
            return;
        }
        if let Err(e) = recording_repo::set_segments_count(&self.db, &self.recording_id, count) {
            warn!("Failed to persist segment count for {}: {}", self.recording_id, e);
        }
    }
}
