//! Test harness for isolated orchestration tests.
//!
//! `TestHarness` provides a temp calls folder, an in-memory catalog and a
//! config rooted at that folder. Engines are fakes so no external tools are
//! needed.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use callscribe::catalog::{AudioMetadata, Recording, RecordingStatus, TranscriptSegment};
use callscribe::db::recording_repo;
use callscribe::engines::{Engines, MetadataProber, NoCallerLookup, Transcriber, Transcription};
use callscribe::error::{EngineError, WorkerError};
use callscribe::{
    Config, Control, Database, Deadline, ExecutionRuntime, Ingestor, RecordingWorker,
};

use super::builders::ConfigBuilder;

pub struct TestHarness {
    temp_dir: TempDir,
    pub calls_dir: PathBuf,
    pub db: Database,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|b| b)
    }

    /// Harness whose config is adjusted by `build`.
    pub fn with_config(build: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let calls_dir = temp_dir.path().join("calls");
        std::fs::create_dir_all(&calls_dir).expect("Failed to create calls dir");

        let config = build(ConfigBuilder::new(&calls_dir)).build();
        let db = Database::open_in_memory().expect("Failed to open catalog");

        Self {
            temp_dir,
            calls_dir,
            db,
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates a directory next to the calls folder.
    pub fn sibling_dir(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create dir");
        dir
    }

    /// Writes an audio file below the calls folder.
    pub fn write_audio(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.calls_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent");
        }
        std::fs::write(&path, content).expect("Failed to write audio file");
        path
    }

    /// Writes an audio file whose mtime is long past any stability window.
    pub fn write_settled_audio(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.write_audio(relative, content);
        set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).expect("Failed to set mtime");
        path
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.db.clone(), &self.config)
    }

    pub fn control(&self) -> Control {
        Control::new(self.db.clone(), self.ingestor())
    }

    pub fn worker(&self, transcriber: Arc<dyn Transcriber>) -> RecordingWorker {
        RecordingWorker::new(self.db.clone(), engines(transcriber), &self.config)
    }

    pub fn find(&self, id: &str) -> Recording {
        recording_repo::find_by_id(&self.db, id)
            .expect("Catalog read failed")
            .expect("Recording missing")
    }
}

pub fn engines(transcriber: Arc<dyn Transcriber>) -> Arc<Engines> {
    Arc::new(Engines {
        prober: Arc::new(FixedProbe),
        transcriber,
        diarizer: None,
        caller_lookup: Arc::new(NoCallerLookup),
    })
}

struct FixedProbe;

impl MetadataProber for FixedProbe {
    fn probe(&self, _path: &Path, _deadline: &Deadline) -> Result<AudioMetadata, EngineError> {
        Ok(AudioMetadata {
            duration_sec: Some(12.0),
            sample_rate: Some(16000),
            channels: Some(1),
            codec: Some("aac".to_string()),
            container: Some("mov,mp4,m4a".to_string()),
            ..Default::default()
        })
    }
}

enum Behavior {
    Succeed,
    Fail(String),
    /// Emits segments, then blocks until the deadline passes.
    Hang,
}

/// Transcriber with a fixed script that counts its invocations.
pub struct ScriptedTranscriber {
    behavior: Behavior,
    segments: Vec<TranscriptSegment>,
    pub calls: AtomicUsize,
}

impl ScriptedTranscriber {
    fn with(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            segments: vec![
                segment(0.0, 2.0, "shalom"),
                segment(3.0, 6.5, "ken, ani shomea"),
                segment(7.0, 9.0, "toda"),
            ],
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::with(Behavior::Succeed)
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::with(Behavior::Fail(message.to_string()))
    }

    pub fn hanging() -> Arc<Self> {
        Self::with(Behavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        start,
        end,
        text: text.to_string(),
        speaker: None,
    }
}

impl Transcriber for ScriptedTranscriber {
    fn model_name(&self) -> &str {
        "fake-whisper"
    }

    fn transcribe(
        &self,
        _path: &Path,
        deadline: &Deadline,
        on_segment: &mut dyn FnMut(usize),
    ) -> Result<Transcription, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => {
                for i in 1..=self.segments.len() {
                    on_segment(i);
                }
                Ok(Transcription {
                    language: Some("he".to_string()),
                    language_probability: Some(0.97),
                    duration: Some(12.0),
                    text: self
                        .segments
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                    segments: self.segments.clone(),
                })
            }
            Behavior::Fail(message) => {
                on_segment(1);
                Err(EngineError::Unavailable(message.clone()))
            }
            Behavior::Hang => {
                on_segment(1);
                on_segment(2);
                while !deadline.is_expired() {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(EngineError::Timeout {
                    program: "fake-whisper".to_string(),
                    limit: deadline.limit().unwrap_or_default(),
                })
            }
        }
    }
}

/// Execution runtime double: records submissions and reports a
/// configurable set of known ids. When given a catalog it also records the
/// status each submitted row had at the moment of submission.
#[derive(Default)]
pub struct FakeRuntime {
    pub submitted: Mutex<Vec<String>>,
    pub known: Mutex<HashSet<String>>,
    pub unavailable: AtomicBool,
    catalog: Option<Database>,
    seen_at_submit: Mutex<Vec<Option<RecordingStatus>>>,
}

impl FakeRuntime {
    pub fn with_known(ids: &[&str]) -> Arc<Self> {
        let runtime = Self::default();
        runtime
            .known
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        Arc::new(runtime)
    }

    pub fn observing(db: &Database) -> Arc<Self> {
        Arc::new(Self {
            catalog: Some(db.clone()),
            ..Default::default()
        })
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Catalog status of each submission, in submission order.
    pub fn seen_at_submit(&self) -> Vec<Option<RecordingStatus>> {
        self.seen_at_submit.lock().unwrap().clone()
    }
}

impl ExecutionRuntime for FakeRuntime {
    fn submit(&self, recording_id: &str) -> Result<(), WorkerError> {
        if let Some(db) = &self.catalog {
            let status = recording_repo::find_by_id(db, recording_id)
                .unwrap()
                .map(|r| r.status);
            self.seen_at_submit.lock().unwrap().push(status);
        }
        self.submitted.lock().unwrap().push(recording_id.to_string());
        Ok(())
    }

    fn list_active_ids(&self) -> Result<HashSet<String>, WorkerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WorkerError::StateUnavailable("runtime offline".to_string()));
        }
        Ok(self.known.lock().unwrap().clone())
    }

    fn list_reserved_ids(&self) -> Result<HashSet<String>, WorkerError> {
        Ok(HashSet::new())
    }
}
