//! Throttled copying from a secondary source folder into the watch folder.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};

use crate::db::{recording_repo, Database};
use crate::error::WatchError;
use crate::ingest::hashing::{file_name, hash_file};
use crate::ingest::AudioScanner;

pub struct SourceSync {
    source: AudioScanner,
    watch_dir: PathBuf,
    batch_size: usize,
}

impl SourceSync {
    pub fn new(source_dir: &Path, watch_dir: &Path, extensions: &[String], batch_size: usize) -> Self {
        Self {
            source: AudioScanner::new(source_dir, extensions).top_level_only(),
            watch_dir: watch_dir.to_path_buf(),
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Copies up to `batch_size` source files, oldest mtime first. Files
    /// whose name exists in the watch folder or whose content the catalog
    /// already knows are skipped. Returns the number copied.
    pub fn pull(&self, db: &Database) -> Result<usize, WatchError> {
        let mut files: Vec<(SystemTime, PathBuf)> = self
            .source
            .scan()
            .map_err(|source| WatchError::Scan {
                path: self.source.root().to_path_buf(),
                source,
            })?
            .into_iter()
            .map(|p| {
                let mtime = fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (mtime, p)
            })
            .collect();
        files.sort();

        let mut copied = 0;
        let mut seen_hashes = HashSet::new();
        let mut files = files.into_iter().map(|(_, path)| path).peekable();
        while copied < self.batch_size && files.peek().is_some() {
            // Hash just enough candidates to fill the batch, then look them
            // up in one query.
            let mut window = Vec::new();
            while window.len() < self.batch_size - copied {
                let Some(path) = files.next() else { break };
                let name = file_name(&path);
                let target = self.watch_dir.join(&name);
                if target.exists() {
                    continue;
                }
                match hash_file(&path) {
                    Ok(hash) if seen_hashes.insert(hash.clone()) => {
                        window.push((path, target, hash))
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable source file {}: {}", path.display(), e),
                }
            }
            if window.is_empty() {
                break;
            }

            let hashes: Vec<String> = window.iter().map(|(_, _, hash)| hash.clone()).collect();
            let known = recording_repo::find_by_hashes(db, &hashes)?;
            for (path, target, hash) in window {
                if known.contains_key(&hash) {
                    debug!("Source file {} already cataloged", path.display());
                    continue;
                }
                match copy_into(&path, &target) {
                    Ok(()) => {
                        debug!("Synced {}", target.display());
                        copied += 1;
                    }
                    Err(e) => warn!("Failed to copy {}: {}", path.display(), e),
                }
            }
        }

        if copied > 0 {
            info!("Synced {} files from {}", copied, self.source.root().display());
        }
        Ok(copied)
    }
}

/// Copies under a temporary name first so the watcher never sees a
/// partial file with an audio extension.
fn copy_into(source: &Path, target: &Path) -> std::io::Result<()> {
    let partial = target.with_file_name(format!(".{}.partial", file_name(target)));
    fs::copy(source, &partial)?;
    fs::rename(&partial, target).inspect_err(|_| {
        let _ = fs::remove_file(&partial);
    })
}
