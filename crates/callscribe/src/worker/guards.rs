//! Checks a worker runs before touching a recording. Delivery is
//! at-least-once, so every job starts by re-reading the row.

use crate::catalog::{Recording, RecordingStatus, Trigger};
use crate::db::recording_repo::{self, ErrorUpdate, StatusUpdate};
use crate::db::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Already DONE; a duplicate delivery.
    AlreadyDone,
    /// Retries used up. A processing record is failed without running.
    Exhausted { retry_count: u32 },
    /// Not claimed for processing; somebody else owns it or it was reset.
    NotClaimed { status: RecordingStatus },
    Proceed,
}

pub fn evaluate(recording: &Recording, max_retries: u32) -> Entry {
    match recording.status {
        RecordingStatus::Done => Entry::AlreadyDone,
        _ if recording.retry_count >= max_retries => Entry::Exhausted {
            retry_count: recording.retry_count,
        },
        RecordingStatus::Processing => Entry::Proceed,
        status => Entry::NotClaimed { status },
    }
}

/// Reads the record and applies [`evaluate`] in one transaction. An
/// exhausted PROCESSING record is moved to FAILED here. `None` when the
/// record does not exist.
pub fn enter(
    db: &Database,
    id: &str,
    max_retries: u32,
) -> Result<Option<(Recording, Entry)>, DatabaseError> {
    db.with_tx(|tx| {
        let Some(recording) = recording_repo::find_in(tx, id)? else {
            return Ok(None);
        };
        let entry = evaluate(&recording, max_retries);

        if let Entry::Exhausted { retry_count } = entry {
            if recording.status == RecordingStatus::Processing {
                let update = StatusUpdate {
                    error_message: ErrorUpdate::Set(format!(
                        "Refused to start: retries exhausted ({}/{})",
                        retry_count, max_retries
                    )),
                    ..Default::default()
                };
                recording_repo::transition_in(
                    tx,
                    &recording,
                    RecordingStatus::Failed,
                    Trigger::WorkerExhausted,
                    &update,
                )?;
            }
        }

        Ok(Some((recording, entry)))
    })
}
