//! Content and commit hashing with BLAKE3

use crate::dataset::index::IndexEntry;
use crate::error::StorageError;
use crate::types::{CommitHash, ContentHash};
use blake3::Hasher;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Content hash of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash(*blake3::hash(bytes).as_bytes())
}

/// Content hash of a file, streamed from disk.
pub fn hash_file(path: &Path) -> Result<ContentHash, StorageError> {
    let mut file = File::open(path).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to open {:?}: {}", path, e),
        ))
    })?;

    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(ContentHash(*hasher.finalize().as_bytes()))
}

/// Commit hash
///
/// CommitHash = hash("commit" || parent-or-"root" || entry_count || (path_len || path || content_hash)* || message_len || message)
///
/// Entries are visited in path order. Author and timestamp are not part of the
/// hash, so the same parent, tree and message always give the same commit.
pub fn compute_commit_hash(
    parent: Option<&CommitHash>,
    tree: &BTreeMap<String, IndexEntry>,
    message: &str,
) -> CommitHash {
    let mut hasher = Hasher::new();

    // Type discriminator
    hasher.update(b"commit");

    match parent {
        Some(parent) => hasher.update(parent.as_bytes()),
        None => hasher.update(b"root"),
    };

    hasher.update(&(tree.len() as u64).to_be_bytes());
    for (path, entry) in tree {
        hasher.update(&(path.len() as u64).to_be_bytes());
        hasher.update(path.as_bytes());
        hasher.update(entry.hash.as_bytes());
    }

    hasher.update(&(message.len() as u64).to_be_bytes());
    hasher.update(message.as_bytes());

    ContentHash(*hasher.finalize().as_bytes())
}
