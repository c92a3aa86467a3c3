//! Transcript repository. One row per recording, overwritten on reprocess.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::catalog::{Transcript, TranscriptSegment};

fn transcript_from_row(row: &Row<'_>) -> Result<Transcript, rusqlite::Error> {
    let segments_json: String = row.get("segments_json")?;
    let transcript_json: Option<String> = row.get("transcript_json")?;
    let segments: Vec<TranscriptSegment> = serde_json::from_str(&segments_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Transcript {
        recording_id: row.get("recording_id")?,
        model_name: row.get("model_name")?,
        beam_size: row.get("beam_size")?,
        compute_type: row.get("compute_type")?,
        language: row.get("language")?,
        language_probability: row.get("language_probability")?,
        text: row.get("text")?,
        segments,
        transcript_json: transcript_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

/// Inserts or overwrites the transcript for its recording.
pub(crate) fn upsert_in(
    conn: &Connection,
    transcript: &Transcript,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let segments_json =
        serde_json::to_string(&transcript.segments).map_err(|e| DatabaseError::Encode {
            column: "segments_json",
            source: e,
        })?;
    let transcript_json = transcript.transcript_json.as_ref().map(|v| v.to_string());

    conn.execute(
        "INSERT INTO transcripts (recording_id, model_name, beam_size, compute_type, language,
         language_probability, text, segments_json, transcript_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(recording_id) DO UPDATE SET
           model_name = excluded.model_name,
           beam_size = excluded.beam_size,
           compute_type = excluded.compute_type,
           language = excluded.language,
           language_probability = excluded.language_probability,
           text = excluded.text,
           segments_json = excluded.segments_json,
           transcript_json = excluded.transcript_json,
           updated_at = excluded.updated_at",
        params![
            transcript.recording_id,
            transcript.model_name,
            transcript.beam_size,
            transcript.compute_type,
            transcript.language,
            transcript.language_probability,
            transcript.text,
            segments_json,
            transcript_json,
            now,
        ],
    )?;
    Ok(())
}

/// Finds the transcript of a recording.
pub fn find_by_recording(
    db: &Database,
    recording_id: &str,
) -> Result<Option<Transcript>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM transcripts WHERE recording_id = ?1",
                params![recording_id],
                transcript_from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts transcript rows for a recording. Always 0 or 1.
pub fn count_for_recording(db: &Database, recording_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE recording_id = ?1",
            params![recording_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
