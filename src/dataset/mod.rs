//! Local dataset working copies
//!
//! A working copy is a directory of dataset files plus a `.cvc/` metadata
//! directory holding the index, the HEAD pointer and committed objects.
//! Media bytes live in a content-addressed cache shared between working copies.

pub mod commit;
pub mod hasher;
pub mod heads;
pub mod image;
pub mod index;
pub mod local;
pub mod objects;
pub mod path;
pub mod walker;

pub use commit::Commit;
pub use heads::Heads;
pub use index::{FrameLink, Index, IndexEntry, StagedChange};
pub use local::{
    ChangeKind, ImagePushReport, IndexProblem, LocalDataset, PullReport, PushReport, StatusReport,
    SyncContext,
};

use crate::error::StorageError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Metadata directory inside a working copy.
pub const META_DIR: &str = ".cvc";
/// Directory holding dataset frame files.
pub const DATA_DIR: &str = "data";

/// A file written next to its target, waiting to be renamed into place.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    temp: PathBuf,
    target: PathBuf,
}

impl PendingWrite {
    pub(crate) fn prepare(target: &Path, bytes: &[u8]) -> Result<Self, StorageError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        let temp = target.with_file_name(name);
        fs::write(&temp, bytes).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write {:?}: {}", temp, e),
            ))
        })?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    pub(crate) fn commit(self) -> Result<(), StorageError> {
        fs::rename(&self.temp, &self.target).map_err(|e| {
            let _ = fs::remove_file(&self.temp);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to move {:?} into place: {}", self.target, e),
            ))
        })
    }

    pub(crate) fn abort(self) {
        let _ = fs::remove_file(&self.temp);
    }
}

/// Writes `bytes` to `target` via a temporary file and rename.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    PendingWrite::prepare(target, bytes)?.commit()
}

/// Renames every pending write into place, in order. Nothing is renamed
/// unless every write was prepared successfully. When a rename fails, targets
/// already renamed are restored to their previous contents.
pub(crate) fn commit_all(
    writes: Vec<Result<PendingWrite, StorageError>>,
) -> Result<(), StorageError> {
    let mut ready = Vec::with_capacity(writes.len());
    let mut failure = None;
    for write in writes {
        match write {
            Ok(w) => ready.push(w),
            Err(e) => failure = Some(e),
        }
    }
    if let Some(e) = failure {
        for w in ready {
            w.abort();
        }
        return Err(e);
    }
    let mut applied: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(ready.len());
    let mut pending = ready.into_iter();
    while let Some(w) = pending.next() {
        let target = w.target.clone();
        let previous = fs::read(&target).ok();
        if let Err(e) = w.commit() {
            for rest in pending {
                rest.abort();
            }
            for (target, previous) in applied.into_iter().rev() {
                restore(&target, previous);
            }
            return Err(e);
        }
        applied.push((target, previous));
    }
    Ok(())
}

fn restore(target: &Path, previous: Option<Vec<u8>>) {
    let restored = match previous {
        Some(bytes) => write_atomic(target, &bytes),
        None => fs::remove_file(target).map_err(StorageError::from),
    };
    if let Err(e) = restored {
        error!(path = %target.display(), error = %e, "Failed to restore state file");
    } else {
        warn!(path = %target.display(), "Restored state file after a failed write");
    }
}
