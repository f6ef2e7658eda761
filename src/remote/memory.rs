//! In-process remote
//!
//! Implements both remote traits over shared maps. Used by tests and for
//! offline working copies.

use crate::dataset::Commit;
use crate::error::ApiError;
use crate::remote::{non_linear, BlobStore, DatasetRemote, COMMITTED_STATE};
use crate::types::{CommitHash, ContentHash};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct State {
    heads: HashMap<String, CommitHash>,
    commits: HashMap<CommitHash, Commit>,
    blobs: HashMap<ContentHash, Vec<u8>>,
    fail_uploads_matching: Option<String>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    uploads: AtomicUsize,
    exists_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte uploads performed so far.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Existence checks performed so far (one per batch).
    pub fn exists_call_count(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }

    pub fn has_blob(&self, hash: &ContentHash) -> bool {
        self.state.lock().blobs.contains_key(hash)
    }

    /// Moves the remote HEAD without any checks, as another client might.
    pub fn set_head(&self, dataset_id: &str, head: Option<CommitHash>) {
        let mut state = self.state.lock();
        match head {
            Some(hash) => state.heads.insert(dataset_id.to_string(), hash),
            None => state.heads.remove(dataset_id),
        };
    }

    /// Makes uploads whose filename contains `pattern` fail.
    pub fn fail_uploads_matching(&self, pattern: Option<&str>) {
        self.state.lock().fail_uploads_matching = pattern.map(str::to_string);
    }
}

impl DatasetRemote for MemoryRemote {
    fn head(&self, dataset_id: &str) -> Result<Option<CommitHash>, ApiError> {
        Ok(self.state.lock().heads.get(dataset_id).copied())
    }

    fn fetch_commit(&self, _dataset_id: &str, hash: &CommitHash) -> Result<Commit, ApiError> {
        self.state
            .lock()
            .commits
            .get(hash)
            .cloned()
            .ok_or_else(|| ApiError::CommitNotFound(hash.to_hex()))
    }

    fn push_commits(
        &self,
        dataset_id: &str,
        expected_head: Option<CommitHash>,
        commits: &[Commit],
    ) -> Result<CommitHash, ApiError> {
        let mut state = self.state.lock();
        let current = state.heads.get(dataset_id).copied();
        let last = commits.last().map(|c| c.hash);
        if current != expected_head {
            return Err(non_linear(last.as_ref(), current.as_ref()));
        }

        let mut parent = current;
        for commit in commits {
            if commit.parent != parent {
                return Err(ApiError::Consistency(format!(
                    "Commit {} does not follow {}",
                    commit.hash.short(),
                    parent.map(|p| p.short()).unwrap_or_else(|| "the root".to_string())
                )));
            }
            commit.verify()?;
            parent = Some(commit.hash);
        }

        for commit in commits {
            state.commits.insert(commit.hash, commit.clone());
        }
        match parent {
            Some(head) => {
                state.heads.insert(dataset_id.to_string(), head);
                Ok(head)
            }
            None => Err(ApiError::EmptyCommit),
        }
    }

    fn commit_state(&self, _dataset_id: &str) -> Result<String, ApiError> {
        Ok(COMMITTED_STATE.to_string())
    }

    fn generate_id(&self) -> Result<String, ApiError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        Ok(format!("id{:08}", state.next_id))
    }
}

impl BlobStore for MemoryRemote {
    fn exists(&self, hashes: &[ContentHash]) -> Result<Vec<bool>, ApiError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(hashes.iter().map(|h| state.blobs.contains_key(h)).collect())
    }

    fn upload(&self, hash: &ContentHash, bytes: &[u8], filename: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if let Some(pattern) = &state.fail_uploads_matching {
            if filename.contains(pattern.as_str()) {
                return Err(ApiError::Transport(format!("Upload of {} refused", filename)));
            }
        }
        let actual = crate::dataset::hasher::hash_bytes(bytes);
        if actual != *hash {
            return Err(ApiError::StorageError(
                crate::error::StorageError::HashMismatch {
                    path: filename.to_string(),
                    expected: hash.to_hex(),
                    actual: actual.to_hex(),
                },
            ));
        }
        state.blobs.insert(*hash, bytes.to_vec());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self, hash: &ContentHash) -> Result<Vec<u8>, ApiError> {
        self.state
            .lock()
            .blobs
            .get(hash)
            .cloned()
            .ok_or_else(|| ApiError::InvalidId {
                entity: "blob".to_string(),
                id: hash.to_hex(),
            })
    }
}
