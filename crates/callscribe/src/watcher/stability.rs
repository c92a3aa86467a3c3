use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Decides when a file in the watch folder has finished being written.
///
/// A file is ready once its mtime is at least `stable_for` old and its size
/// was seen unchanged on two consecutive polls.
pub struct StabilityTracker {
    stable_for: Duration,
    last_sizes: HashMap<PathBuf, u64>,
}

impl StabilityTracker {
    pub fn new(stable_for: Duration) -> Self {
        Self {
            stable_for,
            last_sizes: HashMap::new(),
        }
    }

    pub fn check(&mut self, path: &Path, size: u64, modified: SystemTime, now: SystemTime) -> bool {
        // A future mtime counts as just written.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < self.stable_for {
            return false;
        }

        match self.last_sizes.insert(path.to_path_buf(), size) {
            Some(previous) => previous == size,
            None => false,
        }
    }

    /// Reads size and mtime from disk. Unreadable files are not ready.
    pub fn observe(&mut self, path: &Path, now: SystemTime) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        self.check(path, meta.len(), modified, now)
    }

    /// Forgets paths that are no longer present.
    pub fn prune(&mut self, present: &HashSet<PathBuf>) {
        self.last_sizes.retain(|path, _| present.contains(path));
    }

    pub fn tracked(&self) -> usize {
        self.last_sizes.len()
    }
}
