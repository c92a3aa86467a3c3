use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Catalog location; defaults to `~/.callscribe/data/callscribe.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_calls_dir")]
    pub calls_dir: String,
    /// Roots that ingestion requests may reach. Empty means `[calls_dir]`.
    #[serde(default)]
    pub allowed_roots: Vec<String>,
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,
    #[serde(default = "default_queue_status_threshold")]
    pub queue_status_threshold: u64,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub diarization: DiarizationConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
}

fn default_calls_dir() -> String {
    "/data/calls".to_string()
}

fn default_audio_extensions() -> Vec<String> {
    [".m4a", ".mp3", ".wav", ".aac", ".ogg", ".flac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_queue_status_threshold() -> u64 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            calls_dir: default_calls_dir(),
            allowed_roots: Vec::new(),
            audio_extensions: default_audio_extensions(),
            queue_status_threshold: default_queue_status_threshold(),
            worker: WorkerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            watcher: WatcherConfig::default(),
            diarization: DiarizationConfig::default(),
            analytics: AnalyticsConfig::default(),
            engines: EnginesConfig::default(),
        }
    }
}

impl Config {
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        if self.allowed_roots.is_empty() {
            vec![PathBuf::from(&self.calls_dir)]
        } else {
            self.allowed_roots.iter().map(PathBuf::from).collect()
        }
    }

    pub fn watch_dir(&self) -> PathBuf {
        PathBuf::from(self.watcher.watch_dir.as_deref().unwrap_or(&self.calls_dir))
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }

    /// Lowercased extensions including the leading dot.
    pub fn extensions(&self) -> Vec<String> {
        self.audio_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_join_timeout")]
    pub heartbeat_join_timeout_secs: u64,
    /// Wall-clock limit per job. Unset or 0 means no limit.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    /// Persist the transcription segment count every N progress updates.
    #[serde(default = "default_progress_persist_every")]
    pub progress_persist_every: u32,
}

fn default_concurrency() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_heartbeat_interval() -> u64 {
    120
}

fn default_heartbeat_join_timeout() -> u64 {
    5
}

fn default_progress_persist_every() -> u32 {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_join_timeout_secs: default_heartbeat_join_timeout(),
            task_timeout_secs: None,
            progress_persist_every: default_progress_persist_every(),
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_join_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_join_timeout_secs)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_dispatch_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,
    /// Upper bound on jobs known to the runtime after a dispatch cycle.
    #[serde(default = "default_admission_ceiling")]
    pub admission_ceiling: usize,
}

fn default_dispatch_interval() -> u64 {
    60
}

fn default_stuck_threshold() -> u64 {
    900
}

fn default_admission_ceiling() -> usize {
    20
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_dispatch_interval(),
            stuck_threshold_secs: default_stuck_threshold(),
            admission_ceiling: default_admission_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Folder to poll; defaults to `calls_dir`.
    #[serde(default)]
    pub watch_dir: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stable_seconds")]
    pub stable_seconds: u64,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_stable_seconds() -> u64 {
    10
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            watch_dir: None,
            poll_interval_secs: default_poll_interval(),
            stable_seconds: default_stable_seconds(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default = "default_sync_batch_size")]
    pub batch_size: usize,
}

fn default_sync_batch_size() -> usize {
    20
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_dir: None,
            batch_size: default_sync_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Recordings longer than this are not diarized.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_duration() -> f64 {
    600.0
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_duration_secs: default_max_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_long_silence")]
    pub long_silence_threshold_secs: f64,
}

fn default_long_silence() -> f64 {
    5.0
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            long_silence_threshold_secs: default_long_silence(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    #[serde(default)]
    pub diarizer: Option<CommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_ffprobe")]
    pub program: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_ffprobe(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

/// External command plus argument template. `{input}` in `args` is replaced
/// by the audio path; other placeholders are engine specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    #[serde(default = "default_transcriber_command")]
    pub command: CommandConfig,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_beam_size")]
    pub beam_size: u32,
    #[serde(default = "default_compute_type")]
    pub compute_type: String,
    /// Per-run limit for the transcription command, on top of the task
    /// deadline. `None` leaves only the task deadline.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_transcriber_command() -> CommandConfig {
    CommandConfig {
        program: "whisper-jsonl".to_string(),
        args: [
            "--model",
            "{model}",
            "--language",
            "{language}",
            "--beam-size",
            "{beam_size}",
            "--compute-type",
            "{compute_type}",
            "{input}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

fn default_model() -> String {
    "large-v3".to_string()
}

fn default_language() -> String {
    "he".to_string()
}

fn default_beam_size() -> u32 {
    5
}

fn default_compute_type() -> String {
    "int8".to_string()
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            command: default_transcriber_command(),
            model: default_model(),
            language: default_language(),
            beam_size: default_beam_size(),
            compute_type: default_compute_type(),
            timeout_secs: None,
        }
    }
}
