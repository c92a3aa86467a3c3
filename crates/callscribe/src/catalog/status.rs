//! Recording lifecycle states and the legal transitions between them.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Discovered,
    Queued,
    Processing,
    Done,
    Failed,
    Skipped,
}

/// What caused a status change. Each legal transition is only legal for
/// specific triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A file was discovered by the ingestor or watcher.
    Ingestion,
    /// The dispatcher claimed a queued record.
    DispatchClaim,
    /// The worker finished every stage.
    WorkerSuccess,
    /// The worker hit a fatal error with retries left.
    WorkerRetry,
    /// The worker hit a fatal error with retries exhausted.
    WorkerExhausted,
    /// The dispatcher reclaimed a record with a stale heartbeat.
    StuckRecovery,
    /// An explicit external reprocess request, including forced ingestion.
    Reprocess,
    /// Re-ingestion matched a previously failed record.
    IngestMatch,
}

impl RecordingStatus {
    pub const ALL: [RecordingStatus; 6] = [
        RecordingStatus::Discovered,
        RecordingStatus::Queued,
        RecordingStatus::Processing,
        RecordingStatus::Done,
        RecordingStatus::Failed,
        RecordingStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Discovered => "discovered",
            RecordingStatus::Queued => "queued",
            RecordingStatus::Processing => "processing",
            RecordingStatus::Done => "done",
            RecordingStatus::Failed => "failed",
            RecordingStatus::Skipped => "skipped",
        }
    }

    /// DONE and FAILED only leave through an explicit reprocess.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingStatus::Done | RecordingStatus::Failed)
    }

    /// Returns true when moving from `self` to `to` is legal for `trigger`.
    pub fn allows(self, to: RecordingStatus, trigger: Trigger) -> bool {
        use RecordingStatus::*;
        use Trigger::*;

        matches!(
            (self, to, trigger),
            (Discovered, Queued, Ingestion)
                | (Queued, Processing, DispatchClaim)
                | (Processing, Done, WorkerSuccess)
                | (Processing, Queued, WorkerRetry)
                | (Processing, Queued, StuckRecovery)
                | (Processing, Failed, WorkerExhausted)
                | (Processing, Failed, StuckRecovery)
                | (Failed, Queued, Reprocess)
                | (Failed, Queued, IngestMatch)
                | (Done, Queued, Reprocess)
        )
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown recording status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for RecordingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

impl ToSql for RecordingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecordingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: ParseStatusError| FromSqlError::Other(Box::new(e)))
    }
}
