//! Operations external callers use to drive the system. Producers here only
//! ever set QUEUED; dispatch stays with the dispatcher.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::catalog::{RecordingDetail, RecordingStatus, Trigger};
use crate::db::recording_repo::{self, RecordingFilter, RequeueOutcome};
use crate::db::{enrichment_repo, transcript_repo, Database};
use crate::error::ControlError;
use crate::ingest::{IngestReport, Ingestor};
use crate::runtime::ExecutionRuntime;

/// Read-only snapshot of queue load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queued: u64,
    pub processing: u64,
    pub active_jobs: usize,
    pub can_accept_more: bool,
    pub threshold: u64,
}

/// A page of recordings plus the total matching count.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingPage {
    pub total: u64,
    pub items: Vec<crate::catalog::Recording>,
}

pub struct Control {
    db: Database,
    ingestor: Ingestor,
    runtime: Option<Arc<dyn ExecutionRuntime>>,
}

impl Control {
    pub fn new(db: Database, ingestor: Ingestor) -> Self {
        Self {
            db,
            ingestor,
            runtime: None,
        }
    }

    /// Attaches the runtime consulted for live job counts.
    pub fn with_runtime(mut self, runtime: Arc<dyn ExecutionRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn submit_for_ingestion(
        &self,
        folder: &Path,
        force_reprocess: bool,
    ) -> Result<IngestReport, ControlError> {
        Ok(self.ingestor.ingest(folder, force_reprocess)?)
    }

    /// Moves a record back to QUEUED with error and retry state cleared.
    pub fn reprocess(&self, recording_id: &str) -> Result<RecordingStatus, ControlError> {
        match recording_repo::requeue(&self.db, recording_id, Trigger::Reprocess)? {
            RequeueOutcome::Requeued { from } => {
                info!("Recording {} requeued from {}", recording_id, from);
                Ok(from)
            }
            RequeueOutcome::Reset => {
                info!("Recording {} was queued; retry state reset", recording_id);
                Ok(RecordingStatus::Queued)
            }
            RequeueOutcome::Rejected { from } => Err(ControlError::Conflict {
                id: recording_id.to_string(),
                status: from,
            }),
            RequeueOutcome::NotFound => Err(ControlError::NotFound {
                id: recording_id.to_string(),
            }),
        }
    }

    pub fn queue_status(&self, threshold: u64) -> Result<QueueStatus, ControlError> {
        let queued = recording_repo::count_by_status(&self.db, RecordingStatus::Queued)?;
        let processing = recording_repo::count_by_status(&self.db, RecordingStatus::Processing)?;

        let active_jobs = match &self.runtime {
            Some(runtime) => runtime.list_active_ids().map(|ids| ids.len()).unwrap_or_else(|e| {
                warn!("Could not read runtime state: {}", e);
                0
            }),
            None => 0,
        };

        Ok(QueueStatus {
            queued,
            processing,
            active_jobs,
            can_accept_more: queued + processing < threshold,
            threshold,
        })
    }

    pub fn get_recording(&self, recording_id: &str) -> Result<RecordingDetail, ControlError> {
        let recording = recording_repo::find_by_id(&self.db, recording_id)?.ok_or_else(|| {
            ControlError::NotFound {
                id: recording_id.to_string(),
            }
        })?;
        Ok(RecordingDetail {
            transcript: transcript_repo::find_by_recording(&self.db, recording_id)?,
            enrichment: enrichment_repo::find_by_recording(&self.db, recording_id)?,
            recording,
        })
    }

    pub fn list_recordings(&self, filter: &RecordingFilter) -> Result<RecordingPage, ControlError> {
        let (items, total) = recording_repo::query(&self.db, filter)?;
        Ok(RecordingPage { total, items })
    }
}
