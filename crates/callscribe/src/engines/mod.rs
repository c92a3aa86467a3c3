//! External analysis engines behind narrow traits, plus the process-wide
//! handle set the workers share.

pub mod diarizer;
pub mod ffprobe;
pub mod process;
pub mod transcriber;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::analysis::SpeakerTurn;
use crate::catalog::{AudioMetadata, TranscriptSegment};
use crate::config::EnginesConfig;
use crate::error::EngineError;
use crate::runtime::Deadline;

pub use diarizer::CommandDiarizer;
pub use ffprobe::FfprobeProber;
pub use transcriber::CommandTranscriber;

pub trait MetadataProber: Send + Sync {
    fn probe(&self, path: &Path, deadline: &Deadline) -> Result<AudioMetadata, EngineError>;
}

/// Raw transcription result before speakers are attached.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    pub language: Option<String>,
    pub language_probability: Option<f64>,
    pub duration: Option<f64>,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

pub trait Transcriber: Send + Sync {
    fn model_name(&self) -> &str;

    fn beam_size(&self) -> Option<u32> {
        None
    }

    fn compute_type(&self) -> Option<&str> {
        None
    }

    /// Transcribes `path`, calling `on_segment` with the running segment
    /// count each time a segment is produced.
    fn transcribe(
        &self,
        path: &Path,
        deadline: &Deadline,
        on_segment: &mut dyn FnMut(usize),
    ) -> Result<Transcription, EngineError>;
}

pub trait Diarizer: Send + Sync {
    fn diarize(&self, path: &Path, deadline: &Deadline) -> Result<Vec<SpeakerTurn>, EngineError>;
}

/// Resolves a display name for a phone number.
pub trait CallerLookup: Send + Sync {
    fn source(&self) -> &str;

    fn lookup(&self, phone_number: &str) -> Option<String>;
}

/// Lookup that never finds anyone.
pub struct NoCallerLookup;

impl CallerLookup for NoCallerLookup {
    fn source(&self) -> &str {
        "none"
    }

    fn lookup(&self, _phone_number: &str) -> Option<String> {
        None
    }
}

/// The engine handles used by the pipeline.
#[derive(Clone)]
pub struct Engines {
    pub prober: Arc<dyn MetadataProber>,
    pub transcriber: Arc<dyn Transcriber>,
    pub diarizer: Option<Arc<dyn Diarizer>>,
    pub caller_lookup: Arc<dyn CallerLookup>,
}

impl Engines {
    pub fn from_config(config: &EnginesConfig) -> Self {
        Self {
            prober: Arc::new(FfprobeProber::new(&config.probe)),
            transcriber: Arc::new(CommandTranscriber::new(&config.transcriber)),
            diarizer: config
                .diarizer
                .as_ref()
                .map(|c| Arc::new(CommandDiarizer::new(c)) as Arc<dyn Diarizer>),
            caller_lookup: Arc::new(NoCallerLookup),
        }
    }
}

static SHARED: OnceLock<Arc<Engines>> = OnceLock::new();

/// Process-wide engines, built from `config` on first use. Later calls
/// return the same handles regardless of their argument.
pub fn shared(config: &EnginesConfig) -> Arc<Engines> {
    SHARED
        .get_or_init(|| {
            log::info!(
                "Initializing engines (transcriber model '{}', diarizer {})",
                config.transcriber.model,
                if config.diarizer.is_some() { "configured" } else { "not configured" }
            );
            Arc::new(Engines::from_config(config))
        })
        .clone()
}
