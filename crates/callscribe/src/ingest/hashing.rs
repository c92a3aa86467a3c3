use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const READ_BUFFER: usize = 64 * 1024;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A file ready for reconciliation.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub file_name: String,
    pub size: i64,
    pub hash: String,
}

impl FileCandidate {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len() as i64;
        let hash = hash_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file_name: file_name(path),
            size,
            hash,
        })
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Hashes every path. Failures are returned per file and never stop the
/// rest of the batch.
pub fn hash_candidates(paths: &[PathBuf]) -> (Vec<FileCandidate>, Vec<String>) {
    let mut candidates = Vec::with_capacity(paths.len());
    let mut errors = Vec::new();
    for path in paths {
        match FileCandidate::from_path(path) {
            Ok(c) => candidates.push(c),
            Err(e) => {
                log::warn!("Failed to hash {}: {}", path.display(), e);
                errors.push(format!("{}: {}", path.display(), e));
            }
        }
    }
    (candidates, errors)
}
