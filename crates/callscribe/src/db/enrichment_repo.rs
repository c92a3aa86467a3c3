//! Enrichment repository: diarization outcome and call analytics.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::catalog::Enrichment;

fn enrichment_from_row(row: &Row<'_>) -> Result<Enrichment, rusqlite::Error> {
    let analytics_json: Option<String> = row.get("analytics_json")?;
    Ok(Enrichment {
        recording_id: row.get("recording_id")?,
        speaker_count: row.get("speaker_count")?,
        diarization_enabled: row.get("diarization_enabled")?,
        diarization_pending: row.get("diarization_pending")?,
        diarization_skip_reason: row.get("diarization_skip_reason")?,
        total_speech_time: row.get("total_speech_time")?,
        total_silence_time: row.get("total_silence_time")?,
        talk_time_ratio: row.get("talk_time_ratio")?,
        silence_ratio: row.get("silence_ratio")?,
        segment_count: row.get("segment_count")?,
        avg_segment_length: row.get("avg_segment_length")?,
        speaker_turns: row.get("speaker_turns")?,
        long_silence_count: row.get("long_silence_count")?,
        long_silence_threshold_sec: row.get("long_silence_threshold_sec")?,
        analytics_json: analytics_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

/// Inserts or overwrites the enrichment for its recording.
pub(crate) fn upsert_in(
    conn: &Connection,
    e: &Enrichment,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let analytics_json = e.analytics_json.as_ref().map(|v| v.to_string());

    conn.execute(
        "INSERT INTO enrichments (recording_id, speaker_count, diarization_enabled,
         diarization_pending, diarization_skip_reason, total_speech_time, total_silence_time,
         talk_time_ratio, silence_ratio, segment_count, avg_segment_length, speaker_turns,
         long_silence_count, long_silence_threshold_sec, analytics_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
         ON CONFLICT(recording_id) DO UPDATE SET
           speaker_count = excluded.speaker_count,
           diarization_enabled = excluded.diarization_enabled,
           diarization_pending = excluded.diarization_pending,
           diarization_skip_reason = excluded.diarization_skip_reason,
           total_speech_time = excluded.total_speech_time,
           total_silence_time = excluded.total_silence_time,
           talk_time_ratio = excluded.talk_time_ratio,
           silence_ratio = excluded.silence_ratio,
           segment_count = excluded.segment_count,
           avg_segment_length = excluded.avg_segment_length,
           speaker_turns = excluded.speaker_turns,
           long_silence_count = excluded.long_silence_count,
           long_silence_threshold_sec = excluded.long_silence_threshold_sec,
           analytics_json = excluded.analytics_json,
           updated_at = excluded.updated_at",
        params![
            e.recording_id,
            e.speaker_count,
            e.diarization_enabled,
            e.diarization_pending,
            e.diarization_skip_reason,
            e.total_speech_time,
            e.total_silence_time,
            e.talk_time_ratio,
            e.silence_ratio,
            e.segment_count,
            e.avg_segment_length,
            e.speaker_turns,
            e.long_silence_count,
            e.long_silence_threshold_sec,
            analytics_json,
            now,
        ],
    )?;
    Ok(())
}

/// Finds the enrichment of a recording.
pub fn find_by_recording(
    db: &Database,
    recording_id: &str,
) -> Result<Option<Enrichment>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM enrichments WHERE recording_id = ?1",
                params![recording_id],
                enrichment_from_row,
            )
            .optional()?;
        Ok(row)
    })
}
