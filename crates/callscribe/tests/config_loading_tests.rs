//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use callscribe::config::{load_config, load_config_from_str, load_or_default};

/// A single config loading test case.
struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "database_path": "/var/lib/callscribe/catalog.db",
            "calls_dir": "/data/calls",
            "allowed_roots": ["/data/calls", "/mnt/archive"],
            "audio_extensions": [".m4a", ".wav"],
            "queue_status_threshold": 50,
            "worker": {
                "concurrency": 2,
                "max_retries": 5,
                "heartbeat_interval_secs": 60,
                "heartbeat_join_timeout_secs": 3,
                "task_timeout_secs": 3600,
                "progress_persist_every": 10
            },
            "dispatcher": {
                "interval_secs": 30,
                "stuck_threshold_secs": 600,
                "admission_ceiling": 8
            },
            "watcher": {
                "enabled": true,
                "watch_dir": "/data/calls/incoming",
                "poll_interval_secs": 15,
                "stable_seconds": 20,
                "sync": { "enabled": true, "source_dir": "/mnt/phone", "batch_size": 10 }
            },
            "diarization": { "enabled": false, "max_duration_secs": 300.0 },
            "analytics": { "long_silence_threshold_secs": 3.5 },
            "engines": {
                "probe": { "program": "/usr/bin/ffprobe", "timeout_secs": 10 },
                "transcriber": {
                    "command": { "program": "whisper-jsonl", "args": ["{input}"] },
                    "model": "medium",
                    "language": "en",
                    "beam_size": 3,
                    "compute_type": "float16",
                    "timeout_secs": 1800
                },
                "diarizer": { "program": "diarize-json", "args": ["{input}"] }
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: r#"{ "version": "1.0", "#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "calls_dir": "/data/calls" }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_field",
        config_json: r#"{ "version": "1.0", "celery_broker": "redis://localhost" }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "zero_retries",
        config_json: r#"{ "version": "1.0", "worker": { "max_retries": 0 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "extension_without_dot",
        config_json: r#"{ "version": "1.0", "audio_extensions": ["m4a"] }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "heartbeat_slower_than_stuck_threshold",
        config_json: r#"{
            "version": "1.0",
            "worker": { "heartbeat_interval_secs": 900 },
            "dispatcher": { "stuck_threshold_secs": 600 }
        }"#,
        should_succeed: false,
        expected_error: Some("must be less than dispatcher.stuck_threshold_secs"),
    },
    ConfigTestCase {
        name: "sync_without_source",
        config_json: r#"{ "version": "1.0", "watcher": { "sync": { "enabled": true } } }"#,
        should_succeed: false,
        expected_error: Some("watcher.sync.source_dir is required"),
    },
];

#[test]
fn test_config_loading() {
    for test_case in CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_config_defaults_applied() {
    let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();

    assert_eq!(config.calls_dir, "/data/calls");
    assert_eq!(config.queue_status_threshold, 20);
    assert_eq!(config.worker.max_retries, 3);
    assert_eq!(config.worker.concurrency, 1);
    assert_eq!(config.worker.heartbeat_interval(), Duration::from_secs(120));
    assert_eq!(config.worker.task_timeout(), None);
    assert_eq!(config.dispatcher.stuck_threshold_secs, 900);
    assert_eq!(config.dispatcher.admission_ceiling, 20);
    assert_eq!(config.watcher.stable_seconds, 10);
    assert!(!config.watcher.enabled);
    assert!(config.diarization.enabled);
    assert_eq!(config.diarization.max_duration_secs, 600.0);
    assert!(config.engines.diarizer.is_none());
    assert!(config.audio_extensions.contains(&".m4a".to_string()));
}

#[test]
fn test_zero_task_timeout_means_unbounded() {
    let config =
        load_config_from_str(r#"{ "version": "1.0", "worker": { "task_timeout_secs": 0 } }"#)
            .unwrap();
    assert_eq!(config.worker.task_timeout(), None);
}

#[test]
fn test_allowed_roots_default_to_calls_dir() {
    let config = load_config_from_str(r#"{ "version": "1.0", "calls_dir": "/srv/calls" }"#).unwrap();
    assert_eq!(
        config.allowed_roots(),
        vec![std::path::PathBuf::from("/srv/calls")]
    );
    assert_eq!(config.watch_dir(), std::path::PathBuf::from("/srv/calls"));
}

#[test]
fn test_load_from_file_and_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("callscribe.json");
    std::fs::write(&path, r#"{ "version": "1.0", "queue_status_threshold": 7 }"#).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.queue_status_threshold, 7);

    let err = load_config(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));

    let defaults = load_or_default(None).unwrap();
    assert_eq!(defaults.version, "1.0");
}
