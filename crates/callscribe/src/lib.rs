pub mod analysis;
pub mod catalog;
pub mod config;
pub mod control;
pub mod db;
pub mod dispatcher;
pub mod engines;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod runtime;
pub mod watcher;
pub mod worker;

pub use catalog::{Recording, RecordingDetail, RecordingStatus, Trigger};
pub use config::{load_config, load_or_default, Config};
pub use control::{Control, QueueStatus};
pub use db::Database;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{
    CallscribeError, ConfigError, ControlError, EngineError, IngestError, Result, WatchError,
    WorkerError,
};
pub use ingest::{IngestReport, Ingestor};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use runtime::{Deadline, ExecutionRuntime, JobHandler, WorkerPool};
pub use watcher::{PollReport, Watcher};
pub use worker::{RecordingWorker, WorkerOutcome};
