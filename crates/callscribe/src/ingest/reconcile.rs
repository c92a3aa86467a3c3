//! Decides, per candidate file, whether ingestion creates, requeues or skips.

use std::collections::{HashMap, HashSet};

use crate::catalog::{NewRecording, Recording, RecordingStatus, Trigger};
use crate::db::recording_repo::PlannedRequeue;

use super::hashing::FileCandidate;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Requeue matching DONE and FAILED records.
    pub force_reprocess: bool,
    /// Requeue matching FAILED records without force.
    pub requeue_failed: bool,
    /// Treat a known file name as a match even when the hash is new.
    pub match_names: bool,
}

impl ReconcileOptions {
    /// Submit-for-ingestion semantics.
    pub fn ingest(force_reprocess: bool) -> Self {
        Self {
            force_reprocess,
            requeue_failed: true,
            match_names: false,
        }
    }

    /// Folder-watcher semantics: files sitting in the watch folder never
    /// bounce FAILED records back into the queue.
    pub fn watcher() -> Self {
        Self {
            force_reprocess: false,
            requeue_failed: false,
            match_names: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub creates: Vec<NewRecording>,
    pub requeues: Vec<PlannedRequeue>,
    pub skipped: usize,
}

/// Plans one batch. `candidates` are handled in order; a hash seen earlier
/// in the batch is skipped.
pub fn plan(
    candidates: &[FileCandidate],
    existing: &HashMap<String, Recording>,
    known_names: &HashSet<String>,
    options: ReconcileOptions,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for candidate in candidates {
        if !seen.insert(candidate.hash.as_str()) {
            log::debug!("Duplicate content within batch: {}", candidate.path.display());
            plan.skipped += 1;
            continue;
        }

        match existing.get(&candidate.hash) {
            None if options.match_names && known_names.contains(&candidate.file_name) => {
                plan.skipped += 1;
            }
            None => {
                plan.creates.push(NewRecording::new(
                    &candidate.hash,
                    &candidate.path.to_string_lossy(),
                    &candidate.file_name,
                    candidate.size,
                ));
            }
            Some(recording) => match requeue_trigger(recording.status, options) {
                Some(trigger) => plan.requeues.push(PlannedRequeue {
                    id: recording.id.clone(),
                    trigger,
                }),
                None => plan.skipped += 1,
            },
        }
    }

    plan
}

fn requeue_trigger(status: RecordingStatus, options: ReconcileOptions) -> Option<Trigger> {
    match status {
        RecordingStatus::Failed if options.force_reprocess => Some(Trigger::Reprocess),
        RecordingStatus::Failed if options.requeue_failed => Some(Trigger::IngestMatch),
        RecordingStatus::Done if options.force_reprocess => Some(Trigger::Reprocess),
        // Forcing a queued record only resets its retry state.
        RecordingStatus::Queued if options.force_reprocess => Some(Trigger::Reprocess),
        _ => None,
    }
}
