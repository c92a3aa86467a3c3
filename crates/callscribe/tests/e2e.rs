//! End-to-end flow: ingest a folder, dispatch into the in-process worker
//! pool and wait for the catalog to settle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use callscribe::catalog::RecordingStatus;
use callscribe::db::recording_repo::{self, RecordingFilter};
use callscribe::{Dispatcher, ExecutionRuntime, JobHandler, WorkerPool};
use common::{ScriptedTranscriber, TestHarness};

fn pool(harness: &TestHarness, transcriber: Arc<ScriptedTranscriber>, workers: usize) -> Arc<WorkerPool> {
    let handler: Arc<dyn JobHandler> = Arc::new(harness.worker(transcriber));
    Arc::new(WorkerPool::new(
        handler,
        workers,
        harness.config.dispatcher.admission_ceiling,
        Some(Duration::from_secs(30)),
    ))
}

fn shut_down(pool: Arc<WorkerPool>) {
    pool.shutdown();
    if let Ok(pool) = Arc::try_unwrap(pool) {
        pool.wait();
    }
}

#[test]
fn test_folder_is_transcribed_end_to_end() {
    let harness = TestHarness::with_config(|b| b.diarization(false).admission_ceiling(4));
    for i in 0..6 {
        harness.write_audio(&format!("day1/call-{i}.m4a"), format!("call {i}").as_bytes());
    }
    let report = harness
        .control()
        .submit_for_ingestion(&harness.calls_dir.join("day1"), false)
        .unwrap();
    assert_eq!(report.queued, 6);

    let transcriber = ScriptedTranscriber::succeeding();
    let pool = pool(&harness, transcriber.clone(), 2);
    let runtime: Arc<dyn ExecutionRuntime> = pool.clone();
    let dispatcher = Dispatcher::new(harness.db.clone(), runtime, &harness.config);

    for _ in 0..20 {
        dispatcher.run_cycle().unwrap();
        assert!(pool.in_flight() <= 4);
        assert!(pool.wait_idle(Duration::from_secs(10)));
        if recording_repo::count_by_status(&harness.db, RecordingStatus::Done).unwrap() == 6 {
            break;
        }
    }

    let page = harness
        .control()
        .list_recordings(&RecordingFilter {
            status: Some(RecordingStatus::Done),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(transcriber.calls(), 6);

    // A second pass over the same folder changes nothing.
    let report = harness
        .control()
        .submit_for_ingestion(&harness.calls_dir.join("day1"), false)
        .unwrap();
    assert_eq!(report.queued, 0);
    assert_eq!(report.skipped, 6);

    drop(dispatcher);
    shut_down(pool);
}

#[test]
fn test_failing_engine_ends_in_failed_after_retries() {
    let harness = TestHarness::with_config(|b| b.max_retries(2));
    harness.write_audio("bad.m4a", b"corrupt");
    harness
        .control()
        .submit_for_ingestion(&harness.calls_dir, false)
        .unwrap();

    let pool = pool(&harness, ScriptedTranscriber::failing("unsupported codec"), 1);
    let runtime: Arc<dyn ExecutionRuntime> = pool.clone();
    let dispatcher = Dispatcher::new(harness.db.clone(), runtime, &harness.config);

    for _ in 0..5 {
        dispatcher.run_cycle().unwrap();
        assert!(pool.wait_idle(Duration::from_secs(10)));
    }

    let page = harness
        .control()
        .list_recordings(&RecordingFilter::default())
        .unwrap();
    assert_eq!(page.total, 1);
    let record = &page.items[0];
    assert_eq!(record.status, RecordingStatus::Failed);
    assert_eq!(record.retry_count, 2);
    let message = record.error_message.as_deref().unwrap();
    assert!(message.contains("unsupported codec"));
    assert!(message.contains("retries exhausted (2/2)"));

    // Reprocess gives it a fresh budget.
    let id = record.id.clone();
    harness.control().reprocess(&id).unwrap();
    assert_eq!(harness.find(&id).retry_count, 0);

    drop(dispatcher);
    shut_down(pool);
}
