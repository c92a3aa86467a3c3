use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use super::{Deadline, ExecutionRuntime, JobHandler};
use crate::error::WorkerError;

#[derive(Default)]
struct Tracker {
    reserved: HashSet<String>,
    active: HashSet<String>,
}

type SharedTracker = Arc<Mutex<Tracker>>;

fn lock(tracker: &SharedTracker) -> Result<std::sync::MutexGuard<'_, Tracker>, WorkerError> {
    tracker
        .lock()
        .map_err(|_| WorkerError::StateUnavailable("job tracker lock poisoned".to_string()))
}

/// In-process execution runtime: a bounded queue drained by a fixed set of
/// OS threads.
pub struct WorkerPool {
    job_sender: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    tracker: SharedTracker,
}

impl WorkerPool {
    /// Starts `worker_count` threads. `queue_capacity` bounds jobs submitted
    /// but not yet started; `task_timeout` is the per-job wall-clock limit.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        handler: Arc<dyn JobHandler>,
        worker_count: usize,
        queue_capacity: usize,
        task_timeout: Option<Duration>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<String>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let tracker: SharedTracker = Arc::default();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let job_rx = job_receiver.clone();
                let shutdown_flag = Arc::clone(&shutdown);
                let tracker = Arc::clone(&tracker);
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    run_worker(worker_id, job_rx, shutdown_flag, tracker, handler, task_timeout)
                })
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            workers,
            shutdown,
            tracker,
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Number of jobs submitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        lock(&self.tracker)
            .map(|t| t.reserved.len() + t.active.len())
            .unwrap_or(0)
    }

    /// Blocks until no job is reserved or running, or `timeout` elapses.
    /// Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.in_flight() == 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.in_flight() == 0
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

impl ExecutionRuntime for WorkerPool {
    fn submit(&self, recording_id: &str) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        lock(&self.tracker)?.reserved.insert(recording_id.to_string());
        if self.job_sender.send(recording_id.to_string()).is_err() {
            lock(&self.tracker)?.reserved.remove(recording_id);
            return Err(WorkerError::ChannelClosed);
        }
        Ok(())
    }

    fn list_active_ids(&self) -> Result<HashSet<String>, WorkerError> {
        Ok(lock(&self.tracker)?.active.clone())
    }

    fn list_reserved_ids(&self) -> Result<HashSet<String>, WorkerError> {
        Ok(lock(&self.tracker)?.reserved.clone())
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    tracker: SharedTracker,
    handler: Arc<dyn JobHandler>,
    task_timeout: Option<Duration>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(recording_id) => {
                if let Ok(mut t) = tracker.lock() {
                    t.reserved.remove(&recording_id);
                    t.active.insert(recording_id.clone());
                }
                debug!("Worker {} processing recording {}", worker_id, recording_id);

                let deadline = Deadline::from_limit(task_timeout);
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| handler.handle(&recording_id, deadline)));
                if outcome.is_err() {
                    warn!(
                        "Worker {} panicked while processing recording {}",
                        worker_id, recording_id
                    );
                }

                if let Ok(mut t) = tracker.lock() {
                    t.active.remove(&recording_id);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
