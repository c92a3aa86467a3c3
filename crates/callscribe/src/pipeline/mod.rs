//! The per-recording stage pipeline run by workers.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{DiarizationOutcome, PipelineContext};
pub use error::{PipelineError, PipelineWarning, Stage};
pub use progress::{CatalogProgress, NoopProgress, ProgressReporter};
pub use runner::Pipeline;
