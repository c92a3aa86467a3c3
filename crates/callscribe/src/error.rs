use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::RecordingStatus;

#[derive(Error, Debug)]
pub enum CallscribeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Control(#[from] ControlError),

    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Input errors of a submit-for-ingestion request. Each is reported before
/// any catalog write.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Access denied: '{path}' is outside the allowed roots")]
    AccessDenied { path: PathBuf },

    #[error("Folder not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    #[error("Failed to resolve '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors of the in-process execution runtime.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Runtime state unavailable: {0}")]
    StateUnavailable(String),
}

/// Failures of the external analysis engines.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Command not found: {program}")]
    CommandMissing { program: String },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' timed out after {}s", .limit.as_secs())]
    Timeout { program: String, limit: Duration },

    #[error("Invalid output from '{program}': {reason}")]
    InvalidOutput { program: String, reason: String },

    #[error("Audio file not found: '{0}'")]
    MissingInput(PathBuf),

    #[error("{0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

/// Errors of the trigger surface.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Recording not found: {id}")]
    NotFound { id: String },

    #[error("Recording {id} is {status} and cannot be requeued")]
    Conflict { id: String, status: RecordingStatus },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, CallscribeError>;
