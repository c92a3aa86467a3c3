//! Dispatcher and worker behavior against the catalog, with fake engines
//! and a fake execution runtime.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use callscribe::catalog::RecordingStatus;
use callscribe::db::recording_repo;
use callscribe::dispatcher::DispatchSettings;
use callscribe::engines::{Transcriber, Transcription};
use callscribe::error::EngineError;
use callscribe::{
    Database, Deadline, DispatchReport, Dispatcher, ExecutionRuntime, WorkerOutcome,
};
use common::{FakeRuntime, RecordingBuilder, ScriptedTranscriber, TestHarness};

fn dispatcher(harness: &TestHarness, runtime: Arc<FakeRuntime>) -> Dispatcher {
    let runtime: Arc<dyn ExecutionRuntime> = runtime;
    Dispatcher::new(harness.db.clone(), runtime, &harness.config)
}

/// Inserts a processing record backed by a real file.
fn claimed_recording(harness: &TestHarness, name: &str, retry_count: u32) -> String {
    let path = harness.write_audio(name, name.as_bytes());
    let hash = callscribe::ingest::hash_file(&path).unwrap();
    let id = RecordingBuilder::new(&hash)
        .file_name(name)
        .status(RecordingStatus::Processing)
        .retry_count(retry_count)
        .insert(&harness.db);
    harness
        .db
        .with_conn(|conn| {
            conn.execute(
                "UPDATE recordings SET file_path = ?2 WHERE id = ?1",
                rusqlite::params![id, path.to_string_lossy()],
            )?;
            Ok(())
        })
        .unwrap();
    id
}

#[test]
fn test_dispatch_respects_admission_ceiling() {
    let harness = TestHarness::with_config(|b| b.admission_ceiling(3));
    for i in 0..5 {
        RecordingBuilder::new(&format!("h{i}")).insert(&harness.db);
    }
    let runtime = FakeRuntime::with_known(&["already-running"]);

    let report = dispatcher(&harness, runtime.clone()).run_cycle().unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(runtime.submitted().len(), 2);
    assert_eq!(
        recording_repo::count_by_status(&harness.db, RecordingStatus::Processing).unwrap(),
        2
    );
    assert_eq!(
        recording_repo::count_by_status(&harness.db, RecordingStatus::Queued).unwrap(),
        3
    );
}

#[test]
fn test_dispatch_claims_before_submit() {
    let harness = TestHarness::new();
    let first = RecordingBuilder::new("h1").insert(&harness.db);
    let second = RecordingBuilder::new("h2").insert(&harness.db);
    let runtime = FakeRuntime::observing(&harness.db);

    dispatcher(&harness, runtime.clone()).run_cycle().unwrap();

    let mut submitted = runtime.submitted();
    submitted.sort();
    let mut expected = vec![first.clone(), second.clone()];
    expected.sort();
    assert_eq!(submitted, expected);
    // Each row was already committed as PROCESSING when the runtime saw it.
    assert_eq!(
        runtime.seen_at_submit(),
        vec![Some(RecordingStatus::Processing); 2]
    );
    assert!(harness.find(&first).claim_token.is_some());
}

#[test]
fn test_queued_with_exhausted_retries_is_not_dispatched() {
    let harness = TestHarness::with_config(|b| b.max_retries(3));
    RecordingBuilder::new("spent").retry_count(3).insert(&harness.db);
    let runtime = Arc::new(FakeRuntime::default());

    let report = dispatcher(&harness, runtime.clone()).run_cycle().unwrap();
    assert_eq!(report.enqueued, 0);
    assert!(runtime.submitted().is_empty());
}

#[test]
fn test_stuck_record_is_requeued_then_failed() {
    let harness = TestHarness::with_config(|b| b.max_retries(2).stuck_threshold_secs(60));
    let id = RecordingBuilder::new("stuck")
        .status(RecordingStatus::Processing)
        .at_step("transcribe", Some(14))
        .stale_for(600)
        .insert(&harness.db);
    // Keep the reclaimed record out of dispatch for this cycle.
    let settings = DispatchSettings {
        admission_ceiling: 0,
        ..DispatchSettings::from_config(&harness.config)
    };
    let runtime: Arc<dyn ExecutionRuntime> = Arc::new(FakeRuntime::default());
    let dispatcher = Dispatcher::with_settings(harness.db.clone(), runtime, settings);

    let report = dispatcher.run_cycle().unwrap();
    assert_eq!(
        report,
        DispatchReport {
            reset_to_queued: 1,
            ..Default::default()
        }
    );
    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Queued);
    assert_eq!(record.retry_count, 1);
    assert!(record.processing_step.is_none());

    // Second stall exhausts the budget.
    harness
        .db
        .with_conn(|conn| {
            conn.execute(
                "UPDATE recordings SET status = 'processing', processing_step = 'diarization' WHERE id = ?1",
                [&id],
            )?;
            Ok(())
        })
        .unwrap();
    recording_repo::set_updated_at(&harness.db, &id, Utc::now() - chrono::Duration::seconds(600))
        .unwrap();

    let report = dispatcher.run_cycle().unwrap();
    assert_eq!(report.failed, 1);
    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Failed);
    assert_eq!(record.retry_count, 2);
    let message = record.error_message.unwrap();
    assert!(message.contains("[stuck job cleanup]"));
    assert!(message.contains("diarization"));
    assert!(message.contains("retries exhausted (2/2)"));
}

#[test]
fn test_record_known_to_runtime_is_never_reclaimed() {
    let harness = TestHarness::with_config(|b| b.stuck_threshold_secs(60));
    let id = RecordingBuilder::new("slow")
        .status(RecordingStatus::Processing)
        .stale_for(3600)
        .insert(&harness.db);
    let runtime = FakeRuntime::with_known(&[id.as_str()]);

    let report = dispatcher(&harness, runtime).run_cycle().unwrap();
    assert_eq!(report.reset_to_queued, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(harness.find(&id).status, RecordingStatus::Processing);
}

#[test]
fn test_fresh_heartbeat_is_not_stuck() {
    let harness = TestHarness::with_config(|b| b.stuck_threshold_secs(60));
    let id = RecordingBuilder::new("alive")
        .status(RecordingStatus::Processing)
        .stale_for(5)
        .insert(&harness.db);

    let report = dispatcher(&harness, Arc::new(FakeRuntime::default()))
        .run_cycle()
        .unwrap();
    assert_eq!(report.reset_to_queued, 0);
    assert_eq!(harness.find(&id).status, RecordingStatus::Processing);
}

#[test]
fn test_unavailable_runtime_still_dispatches() {
    let harness = TestHarness::new();
    RecordingBuilder::new("h").insert(&harness.db);
    let runtime = Arc::new(FakeRuntime::default());
    runtime
        .unavailable
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let report = dispatcher(&harness, runtime.clone()).run_cycle().unwrap();
    assert_eq!(report.enqueued, 1);
}

#[test]
fn test_worker_completes_claimed_recording() {
    let harness = TestHarness::with_config(|b| b.diarization(false));
    let id = claimed_recording(&harness, "Call recording +15551234567_240301_101500.m4a", 0);
    let transcriber = ScriptedTranscriber::succeeding();

    let outcome = harness
        .worker(transcriber.clone())
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::Completed);

    let detail = harness.control().get_recording(&id).unwrap();
    assert_eq!(detail.recording.status, RecordingStatus::Done);
    assert!(detail.recording.processed_at.is_some());
    assert!(detail.recording.processing_step.is_none());
    let transcript = detail.transcript.unwrap();
    assert_eq!(transcript.segments.len(), 3);
    let enrichment = detail.enrichment.unwrap();
    assert_eq!(enrichment.segment_count, 3);
    assert!(!enrichment.diarization_enabled);
}

/// Serialized children plus their row timestamps, to detect any rewrite.
fn children_snapshot(harness: &TestHarness, id: &str) -> (serde_json::Value, serde_json::Value, String, String) {
    let detail = harness.control().get_recording(id).unwrap();
    let (transcript_at, enrichment_at) = harness
        .db
        .with_conn(|conn| {
            let transcript_at: String = conn.query_row(
                "SELECT updated_at FROM transcripts WHERE recording_id = ?1",
                [id],
                |r| r.get(0),
            )?;
            let enrichment_at: String = conn.query_row(
                "SELECT updated_at FROM enrichments WHERE recording_id = ?1",
                [id],
                |r| r.get(0),
            )?;
            Ok((transcript_at, enrichment_at))
        })
        .unwrap();
    (
        serde_json::to_value(detail.transcript.unwrap()).unwrap(),
        serde_json::to_value(detail.enrichment.unwrap()).unwrap(),
        transcript_at,
        enrichment_at,
    )
}

#[test]
fn test_worker_skips_done_without_calling_engines() {
    let harness = TestHarness::with_config(|b| b.diarization(false));
    let id = claimed_recording(&harness, "redelivered.m4a", 0);
    let outcome = harness
        .worker(ScriptedTranscriber::succeeding())
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::Completed);
    let before = harness.find(&id);
    let children_before = children_snapshot(&harness, &id);

    // A duplicate delivery of the same job.
    std::thread::sleep(Duration::from_millis(20));
    let transcriber = ScriptedTranscriber::succeeding();
    let outcome = harness
        .worker(transcriber.clone())
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::AlreadyDone);
    assert_eq!(transcriber.calls(), 0);

    let after = harness.find(&id);
    assert_eq!(after.status, RecordingStatus::Done);
    assert_eq!(after.processed_at, before.processed_at);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(children_snapshot(&harness, &id), children_before);
}

#[test]
fn test_worker_refuses_exhausted_record() {
    let harness = TestHarness::with_config(|b| b.max_retries(3));
    let id = RecordingBuilder::new("spent")
        .status(RecordingStatus::Processing)
        .retry_count(3)
        .insert(&harness.db);
    let transcriber = ScriptedTranscriber::succeeding();

    let outcome = harness
        .worker(transcriber.clone())
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::RefusedExhausted { retry_count: 3 });
    assert_eq!(transcriber.calls(), 0);

    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Failed);
    assert!(record
        .error_message
        .unwrap()
        .contains("retries exhausted (3/3)"));
}

#[test]
fn test_worker_ignores_unclaimed_record() {
    let harness = TestHarness::new();
    let id = RecordingBuilder::new("waiting").insert(&harness.db);
    let transcriber = ScriptedTranscriber::succeeding();

    let outcome = harness
        .worker(transcriber.clone())
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(
        outcome,
        WorkerOutcome::NotClaimed {
            status: RecordingStatus::Queued
        }
    );
    assert_eq!(transcriber.calls(), 0);
}

#[test]
fn test_worker_failure_retries_then_fails() {
    let harness = TestHarness::with_config(|b| b.max_retries(2));
    let id = claimed_recording(&harness, "flaky.m4a", 0);
    let worker = harness.worker(ScriptedTranscriber::failing("decoder crashed"));

    let outcome = worker.process(&id, Deadline::unbounded()).unwrap();
    assert!(matches!(outcome, WorkerOutcome::Retrying { retry_count: 1, .. }));
    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Queued);
    let message = record.error_message.unwrap();
    assert!(message.starts_with("[error]"));
    assert!(message.contains("decoder crashed"));
    assert!(message.contains("step 'transcribe' (segments=1)"));
    assert!(record.processing_step.is_none());

    recording_repo::claim(&harness.db, &id, 2).unwrap();
    let outcome = worker.process(&id, Deadline::unbounded()).unwrap();
    assert!(matches!(outcome, WorkerOutcome::Failed { retry_count: 2, .. }));
    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Failed);
    assert!(record
        .error_message
        .unwrap()
        .ends_with("retries exhausted (2/2)"));
}

/// Hands the record to a second run mid-transcription, the way stuck
/// recovery plus a fresh dispatch would, then fails the first run.
struct HandedOffTranscriber {
    db: Database,
    recording_id: String,
}

impl Transcriber for HandedOffTranscriber {
    fn model_name(&self) -> &str {
        "fake-whisper"
    }

    fn transcribe(
        &self,
        _path: &Path,
        _deadline: &Deadline,
        _on_segment: &mut dyn FnMut(usize),
    ) -> Result<Transcription, EngineError> {
        let id = &self.recording_id;
        recording_repo::set_updated_at(&self.db, id, Utc::now() - chrono::Duration::seconds(3600))
            .unwrap();
        recording_repo::reclaim_stuck(&self.db, id, Utc::now(), 60, 5).unwrap();
        assert!(recording_repo::claim(&self.db, id, 5).unwrap().is_applied());
        recording_repo::set_step(&self.db, id, "extract_metadata").unwrap();
        Err(EngineError::Unavailable("first run lost its GPU".to_string()))
    }
}

#[test]
fn test_superseded_worker_leaves_new_claim_alone() {
    let harness = TestHarness::with_config(|b| b.max_retries(5));
    let id = claimed_recording(&harness, "handed-off.m4a", 0);
    let transcriber = Arc::new(HandedOffTranscriber {
        db: harness.db.clone(),
        recording_id: id.clone(),
    });

    let outcome = harness
        .worker(transcriber)
        .process(&id, Deadline::unbounded())
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::Discarded);

    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Processing);
    // Only the stuck recovery counted an attempt.
    assert_eq!(record.retry_count, 1);
    assert!(record.error_message.is_none());
    assert_eq!(record.processing_step.as_deref(), Some("extract_metadata"));
    assert!(record.claim_token.is_some());
}

#[test]
fn test_worker_classifies_timeout() {
    let harness = TestHarness::with_config(|b| b.max_retries(3));
    let id = claimed_recording(&harness, "endless.m4a", 0);

    let outcome = harness
        .worker(ScriptedTranscriber::hanging())
        .process(&id, Deadline::after(Duration::from_millis(200)))
        .unwrap();
    let WorkerOutcome::Retrying { error, .. } = outcome else {
        panic!("expected a retry, got {outcome:?}");
    };
    assert!(error.starts_with("[timeout]"));
    assert!(error.contains("transcribe"));
    assert!(error.contains("segments=2"));
}

#[test]
fn test_reprocess_clears_failure_state() {
    let harness = TestHarness::new();
    let id = RecordingBuilder::new("broken")
        .status(RecordingStatus::Failed)
        .retry_count(3)
        .insert(&harness.db);

    let from = harness.control().reprocess(&id).unwrap();
    assert_eq!(from, RecordingStatus::Failed);

    let record = harness.find(&id);
    assert_eq!(record.status, RecordingStatus::Queued);
    assert_eq!(record.retry_count, 0);
    assert!(record.error_message.is_none());
}

#[test]
fn test_queue_status_reports_load() {
    let harness = TestHarness::new();
    for i in 0..3 {
        RecordingBuilder::new(&format!("q{i}")).insert(&harness.db);
    }
    RecordingBuilder::new("p")
        .status(RecordingStatus::Processing)
        .insert(&harness.db);

    let runtime: Arc<dyn ExecutionRuntime> = FakeRuntime::with_known(&["p"]);
    let control = harness.control().with_runtime(runtime);

    let status = control.queue_status(5).unwrap();
    assert_eq!(status.queued, 3);
    assert_eq!(status.processing, 1);
    assert_eq!(status.active_jobs, 1);
    assert!(status.can_accept_more);

    assert!(!control.queue_status(4).unwrap().can_accept_more);
}
