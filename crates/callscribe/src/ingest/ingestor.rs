use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::Serialize;

use super::access::resolve_within_roots;
use super::hashing::{hash_candidates, FileCandidate};
use super::reconcile::{plan, ReconcileOptions};
use super::scanner::AudioScanner;
use crate::config::Config;
use crate::db::{recording_repo, Database};
use crate::error::IngestError;

/// Outcome counts of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// New recordings created.
    pub discovered: usize,
    /// Recordings now waiting for dispatch: created plus requeued.
    pub queued: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl IngestReport {
    fn aborted(error: String, mut errors: Vec<String>) -> Self {
        errors.push(error);
        Self {
            errors,
            ..Default::default()
        }
    }
}

/// Content-addressed ingestion into the catalog. Never dispatches.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Ingestor {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            roots: config.allowed_roots(),
            extensions: config.extensions(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Ingests every matching file below `folder`. Input errors are
    /// returned before any catalog access.
    pub fn ingest(&self, folder: &Path, force_reprocess: bool) -> Result<IngestReport, IngestError> {
        let folder = resolve_within_roots(folder, &self.roots)?;
        info!(
            "Ingesting {} (force_reprocess={})",
            folder.display(),
            force_reprocess
        );

        let files = match AudioScanner::new(&folder, &self.extensions).scan() {
            Ok(files) => files,
            Err(e) => {
                return Ok(IngestReport::aborted(
                    format!("Failed to scan {}: {}", folder.display(), e),
                    Vec::new(),
                ))
            }
        };

        Ok(self.ingest_paths(&files, ReconcileOptions::ingest(force_reprocess)))
    }

    /// Hashes and reconciles an explicit list of files.
    pub fn ingest_paths(&self, paths: &[PathBuf], options: ReconcileOptions) -> IngestReport {
        let (candidates, errors) = hash_candidates(paths);
        self.reconcile(&candidates, errors, options)
    }

    /// Reconciles already hashed candidates against the catalog and commits
    /// the result in one transaction.
    pub fn reconcile(
        &self,
        candidates: &[FileCandidate],
        errors: Vec<String>,
        options: ReconcileOptions,
    ) -> IngestReport {
        if candidates.is_empty() {
            return IngestReport {
                errors,
                ..Default::default()
            };
        }

        let hashes: Vec<String> = candidates.iter().map(|c| c.hash.clone()).collect();
        let existing = match recording_repo::find_by_hashes(&self.db, &hashes) {
            Ok(existing) => existing,
            Err(e) => {
                error!("Bulk hash lookup failed, aborting batch: {}", e);
                return IngestReport::aborted(format!("Bulk lookup failed: {}", e), errors);
            }
        };

        let known_names = if options.match_names {
            let names: Vec<String> = candidates.iter().map(|c| c.file_name.clone()).collect();
            match recording_repo::existing_file_names(&self.db, &names) {
                Ok(names) => names,
                Err(e) => {
                    error!("Bulk name lookup failed, aborting batch: {}", e);
                    return IngestReport::aborted(format!("Bulk lookup failed: {}", e), errors);
                }
            }
        } else {
            Default::default()
        };

        let plan = plan(candidates, &existing, &known_names, options);

        match recording_repo::apply_ingest(&self.db, &plan.creates, &plan.requeues) {
            Ok(commit) => {
                if !commit.refused.is_empty() {
                    warn!(
                        "{} requeues refused because the records changed concurrently",
                        commit.refused.len()
                    );
                }
                let report = IngestReport {
                    discovered: commit.created,
                    queued: commit.created + commit.requeued,
                    skipped: plan.skipped + commit.refused.len(),
                    errors,
                };
                info!(
                    "Ingest batch committed: discovered={}, queued={}, skipped={}, errors={}",
                    report.discovered,
                    report.queued,
                    report.skipped,
                    report.errors.len()
                );
                report
            }
            Err(e) => {
                error!("Ingest commit failed, batch rolled back: {}", e);
                IngestReport::aborted(format!("Commit failed: {}", e), errors)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NewRecording, RecordingStatus};

    fn setup() -> (tempfile::TempDir, Database, Ingestor) {
        let root = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let config = Config {
            calls_dir: root.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let ingestor = Ingestor::new(db.clone(), &config);
        (root, db, ingestor)
    }

    #[test]
    fn test_ingest_creates_queued_records() {
        let (root, db, ingestor) = setup();
        std::fs::write(root.path().join("a.m4a"), b"a").unwrap();
        std::fs::write(root.path().join("b.mp3"), b"b").unwrap();
        std::fs::write(root.path().join("readme.txt"), b"c").unwrap();

        let report = ingestor.ingest(root.path(), false).unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.queued, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(
            recording_repo::count_by_status(&db, RecordingStatus::Queued).unwrap(),
            2
        );
    }

    #[test]
    fn test_second_ingest_skips_everything() {
        let (root, _db, ingestor) = setup();
        std::fs::write(root.path().join("a.m4a"), b"a").unwrap();

        ingestor.ingest(root.path(), false).unwrap();
        let report = ingestor.ingest(root.path(), false).unwrap();
        assert_eq!(report.discovered, 0);
        assert_eq!(report.queued, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_force_requeues_done() {
        let (root, db, ingestor) = setup();
        let path = root.path().join("a.m4a");
        std::fs::write(&path, b"a").unwrap();
        let hash = super::super::hashing::hash_file(&path).unwrap();
        let new = NewRecording::new(&hash, &path.to_string_lossy(), "a.m4a", 1);
        recording_repo::insert(&db, &new, RecordingStatus::Done).unwrap();

        let report = ingestor.ingest(root.path(), true).unwrap();
        assert_eq!(report.discovered, 0);
        assert_eq!(report.queued, 1);
        let found = recording_repo::find_by_id(&db, &new.id).unwrap().unwrap();
        assert_eq!(found.status, RecordingStatus::Queued);
    }

    #[test]
    fn test_outside_root_is_denied() {
        let (_root, db, ingestor) = setup();
        let elsewhere = tempfile::tempdir().unwrap();
        std::fs::write(elsewhere.path().join("a.m4a"), b"a").unwrap();

        let err = ingestor.ingest(elsewhere.path(), false).unwrap_err();
        assert!(matches!(err, IngestError::AccessDenied { .. }));
        assert_eq!(
            recording_repo::count_by_status(&db, RecordingStatus::Queued).unwrap(),
            0
        );
    }

    #[test]
    fn test_ingest_paths_reports_hash_errors() {
        let (root, _db, ingestor) = setup();
        let good = root.path().join("a.m4a");
        std::fs::write(&good, b"a").unwrap();
        let report = ingestor.ingest_paths(
            &[good, root.path().join("missing.m4a")],
            ReconcileOptions::ingest(false),
        );
        assert_eq!(report.discovered, 1);
        assert_eq!(report.errors.len(), 1);
    }
}
