use crate::analysis::CallAnalytics;
use crate::catalog::{AudioMetadata, CallerInfo, Recording};
use crate::engines::Transcription;

use super::error::{PipelineWarning, Stage};

/// How the diarization stage ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DiarizationOutcome {
    NotRun,
    Applied { speakers: usize },
    /// Not attempted by policy; left pending for a later pass.
    Skipped { reason: String },
    Failed { reason: String },
}

pub struct PipelineContext {
    // Input
    pub recording: Recording,

    // Stage currently or last executing
    pub current_stage: Option<Stage>,

    // Stage 1 result, empty when the file name carries nothing
    pub caller: CallerInfo,

    // Stage 2 result
    pub audio: Option<AudioMetadata>,

    // Stage 3 result, segments gain speakers in stage 4
    pub transcription: Option<Transcription>,
    pub segments_seen: Option<u32>,

    // Stage 4 result
    pub diarization: DiarizationOutcome,

    // Stage 5 result
    pub analytics: Option<CallAnalytics>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            current_stage: None,
            caller: CallerInfo::default(),
            audio: None,
            transcription: None,
            segments_seen: None,
            diarization: DiarizationOutcome::NotRun,
            analytics: None,
            warnings: Vec::new(),
        }
    }

    /// Probed duration, falling back to the transcriber's estimate.
    pub fn duration(&self) -> Option<f64> {
        self.audio
            .as_ref()
            .and_then(|a| a.duration_sec)
            .or_else(|| self.transcription.as_ref().and_then(|t| t.duration))
    }

    /// "step 'x' (segments=n)" for error annotation.
    pub fn position(&self) -> String {
        format!(
            "step '{}' (segments={})",
            self.current_stage.map(|s| s.as_str()).unwrap_or("startup"),
            self.segments_seen
                .map(|n| n.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}
