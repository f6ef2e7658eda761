//! Working copy path keys
//!
//! Index keys are paths relative to the working copy root, `/`-separated and
//! NFC-normalized, so the same file has the same key on every platform.

use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Index key for `path` under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Result<String, StorageError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        StorageError::InvalidPath(format!("{:?} is outside of {:?}", path, root))
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    StorageError::InvalidPath(format!("{:?} is not valid UTF-8", path))
                })?;
                segments.push(name.nfc().collect::<String>());
            }
            Component::CurDir => {}
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "{:?} is not a plain relative path",
                    relative
                )))
            }
        }
    }
    if segments.is_empty() {
        return Err(StorageError::InvalidPath(format!(
            "{:?} names the working copy root",
            path
        )));
    }
    Ok(segments.join("/"))
}

/// Absolute location of an index key. Rejects keys that would escape `root`.
pub fn resolve_key(root: &Path, key: &str) -> Result<PathBuf, StorageError> {
    let mut resolved = root.to_path_buf();
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidPath(format!(
                "Invalid index key '{}'",
                key
            )));
        }
        resolved.push(segment);
    }
    Ok(resolved)
}

/// Canonical absolute path, used for staged image paths.
pub fn canonicalize(path: &Path) -> Result<PathBuf, StorageError> {
    let canonical = dunce::canonicalize(path).map_err(|e| {
        StorageError::InvalidPath(format!("Failed to canonicalize {:?}: {}", path, e))
    })?;
    let normalized: String = canonical.to_string_lossy().nfc().collect();
    Ok(PathBuf::from(normalized))
}
