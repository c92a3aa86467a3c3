use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::RecordingStatus;
use crate::db::DatabaseError;
use crate::error::EngineError;

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseMetadata,
    ExtractMetadata,
    Transcribe,
    Diarization,
    Analytics,
    StoreResults,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ParseMetadata,
        Stage::ExtractMetadata,
        Stage::Transcribe,
        Stage::Diarization,
        Stage::Analytics,
        Stage::StoreResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParseMetadata => "parse_metadata",
            Stage::ExtractMetadata => "extract_metadata",
            Stage::Transcribe => "transcribe",
            Stage::Diarization => "diarization",
            Stage::Analytics => "analytics",
            Stage::StoreResults => "store_results",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Engine {
        stage: Stage,
        #[source]
        source: EngineError,
    },

    #[error("task timed out after {}s during {stage}", .limit.as_secs())]
    Timeout { stage: Stage, limit: Duration },

    #[error("analytics failed: {0}")]
    Analytics(String),

    #[error("catalog write failed during {stage}: {source}")]
    Database {
        stage: Stage,
        #[source]
        source: DatabaseError,
    },

    /// The record left PROCESSING while the pipeline ran; results were
    /// discarded.
    #[error("results discarded: recording is now {status}")]
    Superseded { status: RecordingStatus },

    #[error("recording was deleted while processing")]
    Vanished,
}

impl PipelineError {
    /// True for the task deadline and for an engine's own time limit.
    pub fn is_timeout(&self) -> bool {
        match self {
            PipelineError::Timeout { .. } => true,
            PipelineError::Engine { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Non-fatal problems. The pipeline continues in a degraded mode.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    ParseMetadataFailed(String),
    DiarizationFailed(String),
}
