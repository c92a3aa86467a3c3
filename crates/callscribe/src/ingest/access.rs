//! Confines ingestion requests to the configured storage roots.

use std::path::{Component, Path, PathBuf};

use crate::error::IngestError;

/// Resolves `path` the way the filesystem would: through symlinks when it
/// exists, lexically otherwise.
fn resolve(path: &Path) -> Result<PathBuf, IngestError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| IngestError::Resolve {
                path: path.to_path_buf(),
                source: e,
            })?
            .join(path)
    };

    match absolute.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(normalize(&absolute)),
        Err(e) => Err(IngestError::Resolve {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Collapses `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Checks that `folder` lies inside one of `roots` and is an existing
/// directory. Returns the resolved folder.
pub fn resolve_within_roots(folder: &Path, roots: &[PathBuf]) -> Result<PathBuf, IngestError> {
    let resolved = resolve(folder)?;

    let allowed = roots.iter().any(|root| match resolve(root) {
        Ok(root) => resolved.starts_with(&root),
        Err(e) => {
            log::warn!("Ignoring unresolvable allowed root: {}", e);
            false
        }
    });
    if !allowed {
        return Err(IngestError::AccessDenied { path: resolved });
    }

    if !resolved.exists() {
        return Err(IngestError::NotFound { path: resolved });
    }
    if !resolved.is_dir() {
        return Err(IngestError::NotADirectory { path: resolved });
    }

    Ok(resolved)
}
