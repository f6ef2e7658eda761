//! HEAD pointer
//!
//! `.cvc/HEAD.json` names the dataset a working copy belongs to, the commit
//! checked out locally and the last commit known to be on the remote.

use crate::dataset::PendingWrite;
use crate::error::StorageError;
use crate::types::CommitHash;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heads {
    pub dataset_id: String,
    /// Local HEAD.
    pub head: Option<CommitHash>,
    /// Remote HEAD as of the last clone, pull or push.
    pub synced: Option<CommitHash>,
}

impl Heads {
    pub fn new(dataset_id: &str, head: Option<CommitHash>) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            head,
            synced: head,
        }
    }

    /// Whether local commits exist that the remote has not seen.
    pub fn has_unpushed(&self) -> bool {
        self.head != self.synced
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read HEAD from {:?}: {}", path, e),
            ))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("Invalid HEAD {:?}: {}", path, e)))
    }

    pub(crate) fn prepare_save(&self, path: &Path) -> Result<PendingWrite, StorageError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::Corrupt(format!("Failed to serialize HEAD: {}", e)))?;
        PendingWrite::prepare(path, &bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        self.prepare_save(path)?.commit()
    }
}
