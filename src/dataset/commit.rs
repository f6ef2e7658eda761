//! Commits
//!
//! A commit freezes the staged tree of a working copy. Its hash covers the
//! parent, the (path, content hash) pairs and the message.

use crate::dataset::hasher::compute_commit_hash;
use crate::dataset::index::IndexEntry;
use crate::error::StorageError;
use crate::types::CommitHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub parent: Option<CommitHash>,
    pub tree: BTreeMap<String, IndexEntry>,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl Commit {
    pub fn new(
        parent: Option<CommitHash>,
        tree: BTreeMap<String, IndexEntry>,
        message: &str,
        author: &str,
    ) -> Self {
        let hash = compute_commit_hash(parent.as_ref(), &tree, message);
        Self {
            hash,
            parent,
            tree,
            message: message.to_string(),
            author: author.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Recomputes the hash and checks it against the recorded one.
    pub fn verify(&self) -> Result<(), StorageError> {
        let actual = compute_commit_hash(self.parent.as_ref(), &self.tree, &self.message);
        if actual != self.hash {
            return Err(StorageError::HashMismatch {
                path: format!("commit {}", self.hash.short()),
                expected: self.hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(self)
            .map_err(|e| StorageError::Corrupt(format!("Failed to serialize commit: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        bincode::deserialize(bytes)
            .map_err(|e| StorageError::Corrupt(format!("Failed to deserialize commit: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::hasher::hash_bytes;

    fn tree(files: &[(&str, &[u8])]) -> BTreeMap<String, IndexEntry> {
        files
            .iter()
            .map(|(path, bytes)| {
                (
                    path.to_string(),
                    IndexEntry {
                        hash: hash_bytes(bytes),
                        size: bytes.len() as u64,
                        frame: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_hash_ignores_author_and_time() {
        let t = tree(&[("a.jpg", b"a")]);
        let c1 = Commit::new(None, t.clone(), "first", "ana");
        let c2 = Commit::new(None, t, "first", "bo");
        assert_eq!(c1.hash, c2.hash);
    }

    #[test]
    fn test_bincode_round_trip_and_verify() {
        let commit = Commit::new(None, tree(&[("a.jpg", b"a"), ("b.jpg", b"b")]), "first", "ana");
        let decoded = Commit::from_bytes(&commit.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, commit);
        decoded.verify().unwrap();
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut commit = Commit::new(None, tree(&[("a.jpg", b"a")]), "first", "ana");
        commit.message = "edited".to_string();
        assert!(matches!(
            commit.verify(),
            Err(StorageError::HashMismatch { .. })
        ));
    }
}
