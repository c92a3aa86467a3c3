use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tracing::info_span;

use crate::catalog::RecordingStatus;
use crate::config::Config;
use crate::db::recording_repo::{self, FailureOutcome};
use crate::db::{Database, DatabaseError};
use crate::engines::Engines;
use crate::pipeline::{CatalogProgress, Pipeline, PipelineConfig, PipelineContext, PipelineError};
use crate::runtime::{Deadline, JobHandler};

use super::guards::{self, Entry};
use super::heartbeat::Heartbeat;

/// How one job ended, from the worker's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    Completed,
    AlreadyDone,
    NotFound,
    NotClaimed { status: RecordingStatus },
    RefusedExhausted { retry_count: u32 },
    /// Results were thrown away because the record left PROCESSING.
    Discarded,
    Retrying { retry_count: u32, error: String },
    Failed { retry_count: u32, error: String },
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_retries: u32,
    pub heartbeat_interval: Duration,
    pub heartbeat_join_timeout: Duration,
    pub progress_persist_every: u32,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.worker.max_retries,
            heartbeat_interval: config.worker.heartbeat_interval(),
            heartbeat_join_timeout: config.worker.heartbeat_join_timeout(),
            progress_persist_every: config.worker.progress_persist_every,
        }
    }
}

/// Processes a single recording end to end.
pub struct RecordingWorker {
    db: Database,
    pipeline: Pipeline,
    settings: WorkerSettings,
}

impl RecordingWorker {
    pub fn new(db: Database, engines: Arc<Engines>, config: &Config) -> Self {
        Self::with_settings(
            db.clone(),
            Pipeline::new(db, engines, PipelineConfig::from_config(config)),
            WorkerSettings::from_config(config),
        )
    }

    pub fn with_settings(db: Database, pipeline: Pipeline, settings: WorkerSettings) -> Self {
        Self {
            db,
            pipeline,
            settings,
        }
    }

    pub fn process(&self, recording_id: &str, deadline: Deadline) -> Result<WorkerOutcome, DatabaseError> {
        let _span = info_span!("recording_job", recording_id = %recording_id).entered();
        let max_retries = self.settings.max_retries;

        let Some((recording, entry)) = guards::enter(&self.db, recording_id, max_retries)? else {
            warn!("Recording {} not found; dropping job", recording_id);
            return Ok(WorkerOutcome::NotFound);
        };

        match entry {
            Entry::AlreadyDone => {
                info!("Recording {} already done; skipping", recording_id);
                return Ok(WorkerOutcome::AlreadyDone);
            }
            Entry::Exhausted { retry_count } => {
                warn!(
                    "Recording {} has exhausted retries ({}/{}); refusing to start",
                    recording_id, retry_count, max_retries
                );
                return Ok(WorkerOutcome::RefusedExhausted { retry_count });
            }
            Entry::NotClaimed { status } => {
                warn!("Recording {} is {} and was not claimed; skipping", recording_id, status);
                return Ok(WorkerOutcome::NotClaimed { status });
            }
            Entry::Proceed => {}
        }

        let claim_token = recording.claim_token.clone();
        let mut ctx = PipelineContext::new(recording);
        let result = {
            let _cleanup = JobCleanup {
                db: &self.db,
                recording_id,
                claim_token: claim_token.as_deref(),
                heartbeat: Some(Heartbeat::start(
                    self.db.clone(),
                    recording_id,
                    self.settings.heartbeat_interval,
                )),
                join_timeout: self.settings.heartbeat_join_timeout,
            };
            let progress = CatalogProgress::new(
                self.db.clone(),
                recording_id,
                self.settings.progress_persist_every,
            );
            self.pipeline.run(&mut ctx, &progress, &deadline)
        };

        let err = match result {
            Ok(()) => return Ok(WorkerOutcome::Completed),
            Err(PipelineError::Superseded { status }) => {
                warn!("Recording {} became {} mid-run; results discarded", recording_id, status);
                return Ok(WorkerOutcome::Discarded);
            }
            Err(PipelineError::Vanished) => {
                warn!("Recording {} was deleted mid-run", recording_id);
                return Ok(WorkerOutcome::NotFound);
            }
            Err(e) => e,
        };

        let message = describe_failure(&err, &ctx);
        let outcome = recording_repo::record_failure(
            &self.db,
            recording_id,
            claim_token.as_deref(),
            max_retries,
            |exhausted, attempts| {
                if exhausted {
                    format!("{}; retries exhausted ({}/{})", message, attempts, max_retries)
                } else {
                    message.clone()
                }
            },
        )?;

        Ok(match outcome {
            FailureOutcome::Requeued { retry_count } => {
                warn!(
                    "Recording {} failed (attempt {}/{}), requeued: {}",
                    recording_id, retry_count, max_retries, message
                );
                WorkerOutcome::Retrying {
                    retry_count,
                    error: message,
                }
            }
            FailureOutcome::Failed { retry_count } => {
                error!(
                    "Recording {} failed permanently after {} attempts: {}",
                    recording_id, retry_count, message
                );
                WorkerOutcome::Failed {
                    retry_count,
                    error: message,
                }
            }
            FailureOutcome::Rejected { .. } | FailureOutcome::Superseded => {
                WorkerOutcome::Discarded
            }
            FailureOutcome::NotFound => WorkerOutcome::NotFound,
        })
    }
}

impl JobHandler for RecordingWorker {
    fn handle(&self, recording_id: &str, deadline: Deadline) {
        match self.process(recording_id, deadline) {
            Ok(outcome) => log::debug!("Job {} finished: {:?}", recording_id, outcome),
            Err(e) => error!("Job {} aborted on catalog error: {}", recording_id, e),
        }
    }
}

/// Error text persisted on the recording: timeouts and generic failures
/// are told apart, and the position reached is always included.
fn describe_failure(err: &PipelineError, ctx: &PipelineContext) -> String {
    if err.is_timeout() {
        format!("[timeout] {} at {}", err, ctx.position())
    } else {
        format!("[error] {} at {}", err, ctx.position())
    }
}

/// Stops the heartbeat and clears this run's progress markers on every
/// exit path.
struct JobCleanup<'a> {
    db: &'a Database,
    recording_id: &'a str,
    claim_token: Option<&'a str>,
    heartbeat: Option<Heartbeat>,
    join_timeout: Duration,
}

impl Drop for JobCleanup<'_> {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop(self.join_timeout);
        }
        match recording_repo::clear_progress(self.db, self.recording_id, self.claim_token) {
            Ok(true) => {}
            Ok(false) => log::debug!(
                "Progress for {} already cleared or owned by a later claim",
                self.recording_id
            ),
            Err(e) => warn!("Failed to clear progress for {}: {}", self.recording_id, e),
        }
    }
}
