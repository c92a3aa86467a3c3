use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::RecordingStatus;

/// One recording per distinct content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub file_hash: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub status: RecordingStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,

    /// Transient progress markers, only meaningful while processing.
    pub processing_step: Option<String>,
    pub processing_step_started_at: Option<DateTime<Utc>>,
    pub processing_segments_count: Option<u32>,
    /// Issued on every claim; identifies the run that owns a PROCESSING row.
    pub claim_token: Option<String>,

    // Audio metadata
    pub duration_sec: Option<f64>,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    pub codec: Option<String>,
    pub container: Option<String>,
    pub bit_rate: Option<i64>,
    pub metadata_json: Option<serde_json::Value>,

    // Caller metadata
    pub phone_number: Option<String>,
    pub caller_name: Option<String>,
    pub call_datetime: Option<NaiveDateTime>,

    pub created_at: DateTime<Utc>,
    /// Doubles as the heartbeat: every write refreshes it.
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Recording {
    /// Seconds since the row was last written.
    pub fn staleness_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_seconds()
    }
}

/// A recording about to be created by ingestion.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub id: String,
    pub file_hash: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
}

impl NewRecording {
    pub fn new(file_hash: &str, file_path: &str, file_name: &str, file_size: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_hash: file_hash.to_string(),
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
            file_size,
        }
    }
}

/// Probe results persisted onto the recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration_sec: Option<f64>,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    pub codec: Option<String>,
    pub container: Option<String>,
    pub bit_rate: Option<i64>,
    pub raw: Option<serde_json::Value>,
}

/// Caller details derived from the file name and optional contact lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub phone_number: Option<String>,
    pub raw_phone: Option<String>,
    pub caller_name: Option<String>,
    pub caller_name_source: Option<String>,
    pub call_datetime: Option<NaiveDateTime>,
}

/// A timed piece of transcript text, optionally labelled with a speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// 1:1 child of a recording holding transcription output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub recording_id: String,
    pub model_name: String,
    pub beam_size: Option<i64>,
    pub compute_type: Option<String>,
    pub language: Option<String>,
    pub language_probability: Option<f64>,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub transcript_json: Option<serde_json::Value>,
}

/// 1:1 child of a recording holding diarization and analytics output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub recording_id: String,
    pub speaker_count: i64,
    pub diarization_enabled: bool,
    pub diarization_pending: bool,
    pub diarization_skip_reason: Option<String>,
    pub total_speech_time: f64,
    pub total_silence_time: f64,
    pub talk_time_ratio: f64,
    pub silence_ratio: f64,
    pub segment_count: i64,
    pub avg_segment_length: f64,
    pub speaker_turns: i64,
    pub long_silence_count: i64,
    pub long_silence_threshold_sec: f64,
    pub analytics_json: Option<serde_json::Value>,
}

/// A recording together with its children.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingDetail {
    #[serde(flatten)]
    pub recording: Recording,
    pub transcript: Option<Transcript>,
    pub enrichment: Option<Enrichment>,
}
