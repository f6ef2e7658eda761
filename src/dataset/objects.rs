//! Object and blob stores
//!
//! Both stores are content-addressed with a two-level fan-out:
//! `{root}/{hex[0..2]}/{hex[2..]}`. Storing something that already exists is a
//! no-op.

use crate::dataset::commit::Commit;
use crate::dataset::hasher::{hash_bytes, hash_file};
use crate::dataset::write_atomic;
use crate::error::StorageError;
use crate::types::{CommitHash, ContentHash};
use std::fs;
use std::path::{Path, PathBuf};

/// Commit objects of one working copy: `.cvc/objects/{hh}/{rest}.commit`.
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn commit_path(&self, hash: &CommitHash) -> PathBuf {
        let (dir, rest) = hash.fanout();
        self.root.join(dir).join(format!("{}.commit", rest))
    }

    pub fn contains(&self, hash: &CommitHash) -> bool {
        self.commit_path(hash).exists()
    }

    /// Stores a commit after checking its hash.
    pub fn put(&self, commit: &Commit) -> Result<(), StorageError> {
        commit.verify()?;
        if self.contains(&commit.hash) {
            return Ok(());
        }
        write_atomic(&self.commit_path(&commit.hash), &commit.to_bytes()?)
    }

    /// Loads a commit; `None` when it is not stored.
    pub fn get(&self, hash: &CommitHash) -> Result<Option<Commit>, StorageError> {
        let path = self.commit_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read commit from {:?}: {}", path, e),
            ))
        })?;
        let commit = Commit::from_bytes(&bytes)?;
        if commit.hash != *hash {
            return Err(StorageError::HashMismatch {
                path: path.display().to_string(),
                expected: hash.to_hex(),
                actual: commit.hash.to_hex(),
            });
        }
        Ok(Some(commit))
    }

    /// Walks parent links from `head`, newest first.
    pub fn history(&self, head: Option<CommitHash>) -> Result<Vec<Commit>, StorageError> {
        let mut chain = Vec::new();
        let mut next = head;
        while let Some(hash) = next {
            let commit = self.get(&hash)?.ok_or_else(|| {
                StorageError::Corrupt(format!("Commit {} is missing from the object store", hash))
            })?;
            next = commit.parent;
            chain.push(commit);
        }
        Ok(chain)
    }
}

/// Media blob cache shared by working copies: `{cache}/{hh}/{rest}`.
pub struct BlobCache {
    root: PathBuf,
}

impl BlobCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        let (dir, rest) = hash.fanout();
        self.root.join(dir).join(rest)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.path_for(hash).exists()
    }

    /// Stores bytes under their content hash.
    pub fn put(&self, bytes: &[u8]) -> Result<ContentHash, StorageError> {
        let hash = hash_bytes(bytes);
        if !self.contains(&hash) {
            write_atomic(&self.path_for(&hash), bytes)?;
        }
        Ok(hash)
    }

    /// Copies a file into the cache under `expected`, verifying the content.
    pub fn put_file(&self, source: &Path, expected: &ContentHash) -> Result<(), StorageError> {
        if self.contains(expected) {
            return Ok(());
        }
        let bytes = fs::read(source)?;
        let actual = hash_bytes(&bytes);
        if actual != *expected {
            return Err(StorageError::HashMismatch {
                path: source.display().to_string(),
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        write_atomic(&self.path_for(expected), &bytes)
    }

    pub fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    /// Materializes a cached blob at `dest`, replacing whatever is there.
    pub fn checkout_to(&self, hash: &ContentHash, dest: &Path) -> Result<(), StorageError> {
        let source = self.path_for(hash);
        if !source.exists() {
            return Err(StorageError::Corrupt(format!(
                "Blob {} is not in the cache",
                hash
            )));
        }
        if hash_file(dest).ok() == Some(*hash) {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::read(&source)?;
        write_atomic(dest, &bytes)
    }
}
