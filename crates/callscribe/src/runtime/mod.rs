//! The execution runtime boundary and its in-process implementation.

pub mod deadline;
pub mod pool;

use std::collections::HashSet;

use crate::error::WorkerError;

pub use deadline::Deadline;
pub use pool::WorkerPool;

/// A work queue that runs recording jobs. Delivery is at-least-once; the
/// worker's entry guards absorb duplicates.
pub trait ExecutionRuntime: Send + Sync {
    fn submit(&self, recording_id: &str) -> Result<(), WorkerError>;

    /// Jobs currently running.
    fn list_active_ids(&self) -> Result<HashSet<String>, WorkerError>;

    /// Jobs accepted but not yet started.
    fn list_reserved_ids(&self) -> Result<HashSet<String>, WorkerError>;

    /// Every job the runtime knows about.
    fn list_known_ids(&self) -> Result<HashSet<String>, WorkerError> {
        let mut ids = self.list_active_ids()?;
        ids.extend(self.list_reserved_ids()?);
        Ok(ids)
    }
}

/// Executes one recording job inside the runtime.
pub trait JobHandler: Send + Sync {
    fn handle(&self, recording_id: &str, deadline: Deadline);
}
