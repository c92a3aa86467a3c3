use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::db::{recording_repo, Database};

/// Background thread that refreshes a processing record's `updated_at`
/// while the pipeline runs, so the dispatcher does not mistake it for an
/// abandoned job.
pub struct Heartbeat {
    recording_id: String,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(db: Database, recording_id: &str, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let id = recording_id.to_string();

        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match recording_repo::touch(&db, &id) {
                        Ok(true) => debug!("Heartbeat for {}", id),
                        Ok(false) => {
                            debug!("Recording {} left processing; heartbeat exiting", id);
                            break;
                        }
                        Err(e) => warn!("Heartbeat write for {} failed: {}", id, e),
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let _ = done_tx.send(());
        });

        Self {
            recording_id: recording_id.to_string(),
            stop_tx,
            done_rx,
            handle: Some(handle),
        }
    }

    /// Signals the thread and waits up to `join_timeout` for it to exit.
    /// A thread still blocked after that is detached; returns whether it
    /// stopped in time.
    pub fn stop(mut self, join_timeout: Duration) -> bool {
        let _ = self.stop_tx.try_send(());
        match self.done_rx.recv_timeout(join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Heartbeat for {} did not stop within {:?}; detaching",
                    self.recording_id, join_timeout
                );
                self.handle.take();
                false
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
    }
}
