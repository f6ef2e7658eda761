//! Remote collaborators of the dataset engine
//!
//! `DatasetRemote` owns commit history on the server; `BlobStore` owns media
//! bytes keyed by content hash. The engine only talks to these traits.

pub mod graphql;
pub mod http_blobs;
pub mod memory;

pub use graphql::GraphqlRemote;
pub use http_blobs::HttpBlobStore;
pub use memory::MemoryRemote;

use crate::dataset::Commit;
use crate::error::ApiError;
use crate::types::{CommitHash, ContentHash};

/// Commit state reported once the server has processed the latest push.
pub const COMMITTED_STATE: &str = "committed";

/// Server side of a dataset's commit history.
pub trait DatasetRemote: Send + Sync {
    /// Current remote HEAD, `None` for a dataset without commits.
    fn head(&self, dataset_id: &str) -> Result<Option<CommitHash>, ApiError>;

    fn fetch_commit(&self, dataset_id: &str, hash: &CommitHash) -> Result<Commit, ApiError>;

    /// Appends `commits` (oldest first) if the remote HEAD is still
    /// `expected_head`; otherwise fails with `NonLinearHistory`.
    fn push_commits(
        &self,
        dataset_id: &str,
        expected_head: Option<CommitHash>,
        commits: &[Commit],
    ) -> Result<CommitHash, ApiError>;

    /// Processing state of the dataset's latest commit.
    fn commit_state(&self, dataset_id: &str) -> Result<String, ApiError>;

    /// Fresh server-side identifier.
    fn generate_id(&self) -> Result<String, ApiError>;
}

/// Content-addressed media storage.
pub trait BlobStore: Send + Sync {
    /// One flag per hash, in input order.
    fn exists(&self, hashes: &[ContentHash]) -> Result<Vec<bool>, ApiError>;

    fn upload(&self, hash: &ContentHash, bytes: &[u8], filename: &str) -> Result<(), ApiError>;

    fn download(&self, hash: &ContentHash) -> Result<Vec<u8>, ApiError>;
}

/// Error for a push or pull across diverged heads.
pub(crate) fn non_linear(local: Option<&CommitHash>, remote: Option<&CommitHash>) -> ApiError {
    ApiError::NonLinearHistory {
        local: local.map(|h| h.to_hex()).unwrap_or_else(|| "none".to_string()),
        remote: remote.map(|h| h.to_hex()).unwrap_or_else(|| "none".to_string()),
    }
}
