//! Recording repository: reads, progress writes and guarded status
//! transitions for the `recordings` table.
//!
//! Functions taking a `&Database` lock the connection themselves. The
//! `*_in` variants take a bare connection so callers can compose them inside
//! one transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{enrichment_repo, placeholders, transcript_repo, Database, DatabaseError, IN_CHUNK_SIZE};
use crate::catalog::{
    AudioMetadata, CallerInfo, Enrichment, NewRecording, Recording, RecordingStatus, Transcript,
    Trigger,
};

pub(crate) fn recording_from_row(row: &Row<'_>) -> Result<Recording, rusqlite::Error> {
    let metadata_json: Option<String> = row.get("metadata_json")?;
    Ok(Recording {
        id: row.get("id")?,
        file_hash: row.get("file_hash")?,
        file_path: row.get("file_path")?,
        file_name: row.get("file_name")?,
        file_size: row.get("file_size")?,
        status: row.get("status")?,
        error_message: row.get("error_message")?,
        retry_count: row.get("retry_count")?,
        processing_step: row.get("processing_step")?,
        processing_step_started_at: row.get("processing_step_started_at")?,
        processing_segments_count: row.get("processing_segments_count")?,
        claim_token: row.get("claim_token")?,
        duration_sec: row.get("duration_sec")?,
        sample_rate: row.get("sample_rate")?,
        channels: row.get("channels")?,
        codec: row.get("codec")?,
        container: row.get("container")?,
        bit_rate: row.get("bit_rate")?,
        metadata_json: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
        phone_number: row.get("phone_number")?,
        caller_name: row.get("caller_name")?,
        call_datetime: row.get("call_datetime")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        processed_at: row.get("processed_at")?,
    })
}

/// How a status change treats `error_message`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ErrorUpdate {
    #[default]
    Keep,
    Clear,
    Set(String),
}

/// Column changes that accompany a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub error_message: ErrorUpdate,
    pub retry_count: Option<u32>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Result of a guarded status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied { from: RecordingStatus },
    Rejected { from: RecordingStatus },
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Result of reclaiming a record whose heartbeat went stale.
#[derive(Debug, Clone, PartialEq)]
pub enum ReclaimOutcome {
    Requeued { retry_count: u32 },
    Failed { retry_count: u32 },
    /// The record changed since it was selected (no longer processing or
    /// freshly touched).
    Unchanged,
}

/// Result of recording a fatal worker error.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    Requeued { retry_count: u32 },
    Failed { retry_count: u32 },
    Rejected { from: RecordingStatus },
    /// The record was reclaimed and claimed again by another run.
    Superseded,
    NotFound,
}

/// Result of moving a record back to QUEUED on request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequeueOutcome {
    Requeued { from: RecordingStatus },
    /// Already queued; retry state was reset in place.
    Reset,
    Rejected { from: RecordingStatus },
    NotFound,
}

/// Filter for listing recordings.
#[derive(Debug, Default, Clone)]
pub struct RecordingFilter {
    pub status: Option<RecordingStatus>,
    pub file_name_contains: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new recording with the given initial status.
pub fn insert(
    db: &Database,
    new: &NewRecording,
    status: RecordingStatus,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_in(conn, new, status, Utc::now()))
}

pub(crate) fn insert_in(
    conn: &Connection,
    new: &NewRecording,
    status: RecordingStatus,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO recordings (id, file_hash, file_path, file_name, file_size, status,
         retry_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![
            new.id,
            new.file_hash,
            new.file_path,
            new.file_name,
            new.file_size,
            status,
            now,
        ],
    )?;
    Ok(())
}

/// Finds a recording by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Recording>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

pub(crate) fn find_in(conn: &Connection, id: &str) -> Result<Option<Recording>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM recordings WHERE id = ?1",
            params![id],
            recording_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Fetches recordings whose hash is in `hashes`, keyed by hash.
///
/// Queries run in chunks of [`IN_CHUNK_SIZE`] to stay under SQLite's bound
/// parameter limit.
pub fn find_by_hashes(
    db: &Database,
    hashes: &[String],
) -> Result<HashMap<String, Recording>, DatabaseError> {
    db.with_conn(|conn| {
        let mut found = HashMap::with_capacity(hashes.len());
        for chunk in hashes.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT * FROM recordings WHERE file_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), recording_from_row)?;
            for row in rows {
                let recording = row?;
                found.insert(recording.file_hash.clone(), recording);
            }
        }
        Ok(found)
    })
}

/// Returns the subset of `names` already present as a recording file name.
pub fn existing_file_names(
    db: &Database,
    names: &[String],
) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut found = HashSet::new();
        for chunk in names.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT file_name FROM recordings WHERE file_name IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |r| r.get::<_, String>(0))?;
            for name in rows {
                found.insert(name?);
            }
        }
        Ok(found)
    })
}

/// Lists recordings in `status`, oldest `updated_at` first.
pub fn list_by_status(
    db: &Database,
    status: RecordingStatus,
    limit: Option<usize>,
) -> Result<Vec<Recording>, DatabaseError> {
    db.with_conn(|conn| {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT * FROM recordings WHERE status = ?1
             ORDER BY updated_at ASC, created_at ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![status, limit], recording_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists queued recordings that may still be dispatched, oldest first.
pub fn list_dispatchable(
    db: &Database,
    max_retries: u32,
    limit: usize,
) -> Result<Vec<Recording>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM recordings WHERE status = ?1 AND retry_count < ?2
             ORDER BY updated_at ASC, created_at ASC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                params![RecordingStatus::Queued, max_retries, limit as i64],
                recording_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts recordings with the given status.
pub fn count_by_status(db: &Database, status: RecordingStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM recordings WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Queries recordings with filters, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &RecordingFilter,
) -> Result<(Vec<Recording>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status));
        }
        if let Some(ref fragment) = filter.file_name_contains {
            conditions.push(format!("file_name LIKE ?{}", param_values.len() + 1));
            param_values.push(Box::new(format!("%{}%", fragment)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM recordings {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM recordings {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), recording_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Liveness write: refreshes `updated_at` of a processing record.
/// Returns false when the record is no longer processing.
pub fn touch(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE recordings SET updated_at = ?2 WHERE id = ?1 AND status = ?3",
            params![id, Utc::now(), RecordingStatus::Processing],
        )?;
        Ok(changed > 0)
    })
}

/// Records the pipeline stage now executing.
pub fn set_step(db: &Database, id: &str, step: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE recordings SET processing_step = ?2, processing_step_started_at = ?3,
             updated_at = ?3 WHERE id = ?1 AND status = ?4",
            params![id, step, now, RecordingStatus::Processing],
        )?;
        Ok(changed > 0)
    })
}

/// Persists transcription progress.
pub fn set_segments_count(db: &Database, id: &str, count: u32) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE recordings SET processing_segments_count = ?2, updated_at = ?3
             WHERE id = ?1 AND status = ?4",
            params![id, count, Utc::now(), RecordingStatus::Processing],
        )?;
        Ok(changed > 0)
    })
}

/// Clears the transient progress markers of a processing row, but only
/// while it still carries `claim_token`. Returns false once the row left
/// PROCESSING or a later claim owns it.
pub fn clear_progress(
    db: &Database,
    id: &str,
    claim_token: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE recordings SET processing_step = NULL, processing_step_started_at = NULL,
             processing_segments_count = NULL, updated_at = ?2
             WHERE id = ?1 AND claim_token IS ?3 AND status = ?4",
            params![id, Utc::now(), claim_token, RecordingStatus::Processing],
        )?;
        Ok(changed > 0)
    })
}

/// Stores caller details parsed from the file name. The details are also
/// merged into `metadata_json.caller_info`.
pub fn update_caller_info(db: &Database, id: &str, info: &CallerInfo) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(());
        };
        let mut metadata = match current.metadata_json {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let caller = serde_json::to_value(info).map_err(|e| DatabaseError::Encode {
            column: "metadata_json",
            source: e,
        })?;
        metadata.insert("caller_info".to_string(), caller);
        let encoded = serde_json::Value::Object(metadata).to_string();

        tx.execute(
            "UPDATE recordings SET phone_number = ?2, caller_name = ?3, call_datetime = ?4,
             metadata_json = ?5, updated_at = ?6 WHERE id = ?1",
            params![
                id,
                info.phone_number,
                info.caller_name,
                info.call_datetime,
                encoded,
                Utc::now(),
            ],
        )?;
        Ok(())
    })
}

/// Stores probe results. Existing `caller_info` in `metadata_json` is kept.
pub fn update_audio_metadata(
    db: &Database,
    id: &str,
    meta: &AudioMetadata,
) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(());
        };
        let mut metadata = match &meta.raw {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(caller) = current
            .metadata_json
            .as_ref()
            .and_then(|v| v.get("caller_info"))
        {
            metadata.insert("caller_info".to_string(), caller.clone());
        }
        let encoded = serde_json::Value::Object(metadata).to_string();

        tx.execute(
            "UPDATE recordings SET duration_sec = ?2, sample_rate = ?3, channels = ?4,
             codec = ?5, container = ?6, bit_rate = ?7, metadata_json = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                meta.duration_sec,
                meta.sample_rate,
                meta.channels,
                meta.codec,
                meta.container,
                meta.bit_rate,
                encoded,
                Utc::now(),
            ],
        )?;
        Ok(())
    })
}

/// Applies a status transition if the table in [`RecordingStatus::allows`]
/// permits it for `trigger`. Illegal transitions are logged and leave the
/// row untouched.
pub fn transition(
    db: &Database,
    id: &str,
    to: RecordingStatus,
    trigger: Trigger,
    update: &StatusUpdate,
) -> Result<TransitionOutcome, DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(TransitionOutcome::NotFound);
        };
        transition_in(tx, &current, to, trigger, update)
    })
}

/// Transition against a row already read inside the caller's transaction.
///
/// Every legal transition enters or leaves PROCESSING, so the transient
/// progress markers are always cleared here. Entering PROCESSING issues a
/// fresh claim token; leaving it drops the token.
pub(crate) fn transition_in(
    conn: &Connection,
    current: &Recording,
    to: RecordingStatus,
    trigger: Trigger,
    update: &StatusUpdate,
) -> Result<TransitionOutcome, DatabaseError> {
    let from = current.status;
    if !from.allows(to, trigger) {
        log::warn!(
            "Refusing illegal transition {} -> {} ({:?}) for recording {}",
            from,
            to,
            trigger,
            current.id
        );
        return Ok(TransitionOutcome::Rejected { from });
    }

    let error_message = match &update.error_message {
        ErrorUpdate::Keep => current.error_message.clone(),
        ErrorUpdate::Clear => None,
        ErrorUpdate::Set(message) => Some(message.clone()),
    };
    let retry_count = update.retry_count.unwrap_or(current.retry_count);
    let processed_at = update.processed_at.or(current.processed_at);
    let claim_token =
        (to == RecordingStatus::Processing).then(|| uuid::Uuid::new_v4().to_string());

    conn.execute(
        "UPDATE recordings SET status = ?2, error_message = ?3, retry_count = ?4,
         processed_at = ?5, processing_step = NULL, processing_step_started_at = NULL,
         processing_segments_count = NULL, claim_token = ?8, updated_at = ?6
         WHERE id = ?1 AND status = ?7",
        params![
            current.id,
            to,
            error_message,
            retry_count,
            processed_at,
            Utc::now(),
            from,
            claim_token,
        ],
    )?;

    log::debug!("Recording {} {} -> {} ({:?})", current.id, from, to, trigger);
    Ok(TransitionOutcome::Applied { from })
}

/// Claims a queued record for dispatch. Records whose retries are
/// exhausted are refused.
pub fn claim(
    db: &Database,
    id: &str,
    max_retries: u32,
) -> Result<TransitionOutcome, DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if current.retry_count >= max_retries {
            log::warn!(
                "Refusing to dispatch recording {} with exhausted retries ({}/{})",
                id,
                current.retry_count,
                max_retries
            );
            return Ok(TransitionOutcome::Rejected {
                from: current.status,
            });
        }
        transition_in(
            tx,
            &current,
            RecordingStatus::Processing,
            Trigger::DispatchClaim,
            &StatusUpdate::default(),
        )
    })
}

/// Reclaims a processing record whose heartbeat is at least
/// `threshold_secs` old. Staleness is re-checked inside the transaction.
pub fn reclaim_stuck(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
    threshold_secs: i64,
    max_retries: u32,
) -> Result<ReclaimOutcome, DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(ReclaimOutcome::Unchanged);
        };
        let age = current.staleness_secs(now);
        if current.status != RecordingStatus::Processing || age < threshold_secs {
            return Ok(ReclaimOutcome::Unchanged);
        }

        let retry_count = current.retry_count.saturating_add(1);
        if retry_count >= max_retries {
            let message = format!(
                "Stuck at step '{}' (segments={}) with no heartbeat for {}s; \
                 retries exhausted ({}/{}) [stuck job cleanup]",
                current.processing_step.as_deref().unwrap_or("unknown"),
                current
                    .processing_segments_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                age,
                retry_count,
                max_retries
            );
            let update = StatusUpdate {
                error_message: ErrorUpdate::Set(message),
                retry_count: Some(retry_count),
                ..Default::default()
            };
            return match transition_in(
                tx,
                &current,
                RecordingStatus::Failed,
                Trigger::StuckRecovery,
                &update,
            )? {
                TransitionOutcome::Applied { .. } => Ok(ReclaimOutcome::Failed { retry_count }),
                _ => Ok(ReclaimOutcome::Unchanged),
            };
        }

        let update = StatusUpdate {
            error_message: ErrorUpdate::Clear,
            retry_count: Some(retry_count),
            ..Default::default()
        };
        match transition_in(
            tx,
            &current,
            RecordingStatus::Queued,
            Trigger::StuckRecovery,
            &update,
        )? {
            TransitionOutcome::Applied { .. } => Ok(ReclaimOutcome::Requeued { retry_count }),
            _ => Ok(ReclaimOutcome::Unchanged),
        }
    })
}

/// Records a fatal pipeline error on a processing record, incrementing
/// `retry_count` and requeueing or failing it. `describe` receives whether
/// retries are exhausted plus the new attempt count and returns the
/// message to persist.
///
/// Only the run holding `claim_token` may fail the record.
pub fn record_failure<F>(
    db: &Database,
    id: &str,
    claim_token: Option<&str>,
    max_retries: u32,
    describe: F,
) -> Result<FailureOutcome, DatabaseError>
where
    F: FnOnce(bool, u32) -> String,
{
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(FailureOutcome::NotFound);
        };
        if current.status != RecordingStatus::Processing {
            log::warn!(
                "Not recording failure for recording {}: status is {}",
                id,
                current.status
            );
            return Ok(FailureOutcome::Rejected {
                from: current.status,
            });
        }
        if current.claim_token.as_deref() != claim_token {
            log::warn!(
                "Not recording failure for recording {}: claimed again by another run",
                id
            );
            return Ok(FailureOutcome::Superseded);
        }

        let retry_count = current.retry_count.saturating_add(1);
        let exhausted = retry_count >= max_retries;
        let update = StatusUpdate {
            error_message: ErrorUpdate::Set(describe(exhausted, retry_count)),
            retry_count: Some(retry_count),
            ..Default::default()
        };

        let (to, trigger) = if exhausted {
            (RecordingStatus::Failed, Trigger::WorkerExhausted)
        } else {
            (RecordingStatus::Queued, Trigger::WorkerRetry)
        };

        match transition_in(tx, &current, to, trigger, &update)? {
            TransitionOutcome::Applied { .. } if exhausted => {
                Ok(FailureOutcome::Failed { retry_count })
            }
            TransitionOutcome::Applied { .. } => Ok(FailureOutcome::Requeued { retry_count }),
            TransitionOutcome::Rejected { from } => Ok(FailureOutcome::Rejected { from }),
            TransitionOutcome::NotFound => Ok(FailureOutcome::NotFound),
        }
    })
}

/// Upserts the transcript and enrichment and marks the record DONE in one
/// transaction. Nothing is written unless the record is still processing
/// under `claim_token`.
pub fn complete(
    db: &Database,
    id: &str,
    claim_token: Option<&str>,
    transcript: &Transcript,
    enrichment: &Enrichment,
) -> Result<TransitionOutcome, DatabaseError> {
    db.with_tx(|tx| {
        let Some(current) = find_in(tx, id)? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !current
            .status
            .allows(RecordingStatus::Done, Trigger::WorkerSuccess)
            || current.claim_token.as_deref() != claim_token
        {
            log::warn!(
                "Discarding results for recording {}: status is {} (claim {:?})",
                id,
                current.status,
                current.claim_token
            );
            return Ok(TransitionOutcome::Rejected {
                from: current.status,
            });
        }

        let now = Utc::now();
        transcript_repo::upsert_in(tx, transcript, now)?;
        enrichment_repo::upsert_in(tx, enrichment, now)?;

        let update = StatusUpdate {
            error_message: ErrorUpdate::Clear,
            processed_at: Some(now),
            ..Default::default()
        };
        transition_in(
            tx,
            &current,
            RecordingStatus::Done,
            Trigger::WorkerSuccess,
            &update,
        )
    })
}

/// Moves a record back to QUEUED with cleared error and retry state.
pub fn requeue(db: &Database, id: &str, trigger: Trigger) -> Result<RequeueOutcome, DatabaseError> {
    db.with_tx(|tx| requeue_in(tx, id, trigger))
}

pub(crate) fn requeue_in(
    conn: &Connection,
    id: &str,
    trigger: Trigger,
) -> Result<RequeueOutcome, DatabaseError> {
    let Some(current) = find_in(conn, id)? else {
        return Ok(RequeueOutcome::NotFound);
    };

    if current.status == RecordingStatus::Queued {
        conn.execute(
            "UPDATE recordings SET error_message = NULL, retry_count = 0, updated_at = ?2
             WHERE id = ?1 AND status = ?3",
            params![id, Utc::now(), RecordingStatus::Queued],
        )?;
        return Ok(RequeueOutcome::Reset);
    }

    let update = StatusUpdate {
        error_message: ErrorUpdate::Clear,
        retry_count: Some(0),
        ..Default::default()
    };
    match transition_in(conn, &current, RecordingStatus::Queued, trigger, &update)? {
        TransitionOutcome::Applied { from } => Ok(RequeueOutcome::Requeued { from }),
        TransitionOutcome::Rejected { from } => Ok(RequeueOutcome::Rejected { from }),
        TransitionOutcome::NotFound => Ok(RequeueOutcome::NotFound),
    }
}

/// A requeue planned by ingestion.
#[derive(Debug, Clone)]
pub struct PlannedRequeue {
    pub id: String,
    pub trigger: Trigger,
}

/// What an ingestion commit actually changed.
#[derive(Debug, Default, Clone)]
pub struct IngestCommit {
    pub created: usize,
    pub requeued: usize,
    /// Planned requeues refused because the row changed concurrently.
    pub refused: Vec<String>,
}

/// Writes all creates and requeues of one ingestion batch in a single
/// transaction. Any error rolls back the whole batch.
///
/// New rows are written as DISCOVERED and promoted to QUEUED through the
/// transition table, so no DISCOVERED row survives the commit.
pub fn apply_ingest(
    db: &Database,
    creates: &[NewRecording],
    requeues: &[PlannedRequeue],
) -> Result<IngestCommit, DatabaseError> {
    db.with_tx(|tx| {
        let now = Utc::now();
        let mut commit = IngestCommit::default();

        for new in creates {
            insert_in(tx, new, RecordingStatus::Discovered, now)?;
            let discovered =
                find_in(tx, &new.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            transition_in(
                tx,
                &discovered,
                RecordingStatus::Queued,
                Trigger::Ingestion,
                &StatusUpdate::default(),
            )?;
            commit.created += 1;
        }

        for planned in requeues {
            match requeue_in(tx, &planned.id, planned.trigger)? {
                RequeueOutcome::Requeued { .. } | RequeueOutcome::Reset => commit.requeued += 1,
                RequeueOutcome::Rejected { .. } | RequeueOutcome::NotFound => {
                    commit.refused.push(planned.id.clone())
                }
            }
        }

        Ok(commit)
    })
}

/// Overrides the heartbeat timestamp. Used by operator tooling and tests to
/// simulate an abandoned job.
pub fn set_updated_at(db: &Database, id: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE recordings SET updated_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    })
}
