//! The single authority that moves recordings from QUEUED to PROCESSING.
//!
//! Each cycle first reclaims PROCESSING records nobody is working on, then
//! claims queued records up to the admission room and submits them to the
//! execution runtime. Claims are committed before submission.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::catalog::RecordingStatus;
use crate::config::Config;
use crate::db::recording_repo::{self, ReclaimOutcome, TransitionOutcome};
use crate::db::{Database, DatabaseError};
use crate::runtime::ExecutionRuntime;

/// Counts of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub failed: usize,
    pub reset_to_queued: usize,
    pub enqueued: usize,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_retries: u32,
    pub stuck_threshold_secs: i64,
    pub admission_ceiling: usize,
    pub interval: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.worker.max_retries,
            stuck_threshold_secs: i64::try_from(config.dispatcher.stuck_threshold_secs)
                .unwrap_or(i64::MAX),
            admission_ceiling: config.dispatcher.admission_ceiling,
            interval: Duration::from_secs(config.dispatcher.interval_secs),
        }
    }
}

pub struct Dispatcher {
    db: Database,
    runtime: Arc<dyn ExecutionRuntime>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(db: Database, runtime: Arc<dyn ExecutionRuntime>, config: &Config) -> Self {
        Self::with_settings(db, runtime, DispatchSettings::from_config(config))
    }

    pub fn with_settings(
        db: Database,
        runtime: Arc<dyn ExecutionRuntime>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            db,
            runtime,
            settings,
        }
    }

    pub fn run_cycle(&self) -> Result<DispatchReport, DatabaseError> {
        self.run_cycle_at(Utc::now())
    }

    /// One cycle with `now` as the staleness reference.
    pub fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<DispatchReport, DatabaseError> {
        let mut report = DispatchReport::default();

        let known = match self.runtime.list_known_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Runtime state unavailable, assuming nothing is in flight: {}", e);
                HashSet::new()
            }
        };

        self.recover_stuck(now, &known, &mut report)?;
        self.dispatch_queued(known.len(), &mut report)?;

        if report != DispatchReport::default() {
            info!(
                "Dispatch cycle: {} failed, {} reset to queued, {} enqueued",
                report.failed, report.reset_to_queued, report.enqueued
            );
        }
        Ok(report)
    }

    fn recover_stuck(
        &self,
        now: DateTime<Utc>,
        known: &HashSet<String>,
        report: &mut DispatchReport,
    ) -> Result<(), DatabaseError> {
        for recording in recording_repo::list_by_status(&self.db, RecordingStatus::Processing, None)? {
            if known.contains(&recording.id) {
                continue;
            }
            if recording.staleness_secs(now) < self.settings.stuck_threshold_secs {
                continue;
            }

            match recording_repo::reclaim_stuck(
                &self.db,
                &recording.id,
                now,
                self.settings.stuck_threshold_secs,
                self.settings.max_retries,
            )? {
                ReclaimOutcome::Requeued { retry_count } => {
                    warn!(
                        "Requeued stuck recording {} (attempt {}/{})",
                        recording.id, retry_count, self.settings.max_retries
                    );
                    report.reset_to_queued += 1;
                }
                ReclaimOutcome::Failed { retry_count } => {
                    error!(
                        "Failed stuck recording {} after {} attempts",
                        recording.id, retry_count
                    );
                    report.failed += 1;
                }
                ReclaimOutcome::Unchanged => {
                    debug!("Recording {} changed before reclaim", recording.id)
                }
            }
        }
        Ok(())
    }

    fn dispatch_queued(&self, in_flight: usize, report: &mut DispatchReport) -> Result<(), DatabaseError> {
        let room = self.settings.admission_ceiling.saturating_sub(in_flight);
        if room == 0 {
            debug!(
                "No admission room ({} in flight, ceiling {})",
                in_flight, self.settings.admission_ceiling
            );
            return Ok(());
        }

        for recording in recording_repo::list_dispatchable(&self.db, self.settings.max_retries, room)? {
            match recording_repo::claim(&self.db, &recording.id, self.settings.max_retries)? {
                TransitionOutcome::Applied { .. } => {}
                other => {
                    debug!("Skipping recording {}: {:?}", recording.id, other);
                    continue;
                }
            }

            // A failed submit leaves a claimed record for stuck recovery.
            match self.runtime.submit(&recording.id) {
                Ok(()) => {
                    debug!("Dispatched recording {}", recording.id);
                    report.enqueued += 1;
                }
                Err(e) => error!("Failed to submit recording {}: {}", recording.id, e),
            }
        }
        Ok(())
    }

    /// Runs cycles every `interval` until `shutdown` is set.
    pub fn start(&self, shutdown: &AtomicBool) {
        info!(
            "Dispatcher running every {:?} (ceiling {})",
            self.settings.interval, self.settings.admission_ceiling
        );
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.run_cycle() {
                error!("Dispatch cycle failed: {}", e);
            }
            sleep_unless(shutdown, self.settings.interval);
        }
        info!("Dispatcher stopped");
    }
}

/// Sleeps for `duration` in short slices, returning early on shutdown.
pub(crate) fn sleep_unless(shutdown: &AtomicBool, duration: Duration) {
    let started = Instant::now();
    while started.elapsed() < duration {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(Duration::from_millis(100).min(duration));
    }
}
