use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

/// Lists audio files under a directory.
pub struct AudioScanner {
    root: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
}

impl AudioScanner {
    /// `extensions` are matched case-insensitively and include the dot.
    pub fn new<P: AsRef<Path>>(root: P, extensions: &[String]) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            recursive: true,
        }
    }

    /// Restricts the scan to the top level.
    pub fn top_level_only(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Matching files in a stable, path-sorted order.
    pub fn scan(&self) -> std::io::Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", self.root.display()),
            ));
        }

        let mut walker = WalkDir::new(&self.root).min_depth(1).sort_by_file_name();
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.matches(entry.path()) {
                debug!("Found audio file: {}", entry.path().display());
                files.push(entry.into_path());
            }
        }

        info!("Scanned {} audio files in {}", files.len(), self.root.display());
        Ok(files)
    }
}
