//! Job execution for a single recording: entry guards, heartbeat and the
//! failure policy around the pipeline.

pub mod guards;
pub mod heartbeat;
pub mod processor;

pub use heartbeat::Heartbeat;
pub use processor::{RecordingWorker, WorkerOutcome, WorkerSettings};
