//! Persisted domain model: recordings, their children, and lifecycle rules.

pub mod model;
pub mod status;

pub use model::{
    AudioMetadata, CallerInfo, Enrichment, NewRecording, Recording, RecordingDetail, Transcript,
    TranscriptSegment,
};
pub use status::{ParseStatusError, RecordingStatus, Trigger};
