//! Error types for the Conservator client.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Local storage errors: working copy files, object store, blob cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not a local dataset (missing .cvc directory): {0}")]
    InvalidLocalDataset(PathBuf),

    #[error("Path already exists: {0}")]
    PathExists(PathBuf),

    #[error("Corrupt local state: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by queries, proxies, pagination and synchronization.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure. Retried by the connection up to `max_retries`.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with GraphQL errors (auth, schema mismatch, ...).
    #[error("Server rejected query: {}", summarize_errors(.errors))]
    Server {
        document: String,
        errors: Vec<serde_json::Value>,
    },

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Malformed field path: '{0}'")]
    MalformedFieldPath(String),

    #[error("Missing required field '{field}' for id '{id}'")]
    MissingField { field: String, id: String },

    #[error("No {entity} with id '{id}'")]
    InvalidId { entity: String, id: String },

    #[error("Ambiguous identifier: '{0}' matches more than one object")]
    AmbiguousIdentifier(String),

    #[error("{entity} does not support {capability}")]
    Unsupported {
        entity: String,
        capability: String,
    },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error(
        "Query results changed during pagination (page {page}): total was {expected}, now {observed}"
    )]
    ConcurrentQueryModification {
        page: usize,
        expected: u64,
        observed: u64,
    },

    #[error("Non-linear history: local head {local} does not descend from remote head {remote}")]
    NonLinearHistory { local: String, remote: String },

    #[error("Nothing staged, nothing to commit")]
    EmptyCommit,

    #[error("{0} staged change(s) would be discarded; commit them or confirm discarding")]
    UncommittedChanges(usize),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Timed out after {waited:?} waiting for {what}")]
    ProcessingTimeout { what: String, waited: Duration },

    #[error("Upload failed for {} file(s) ({completed} completed): {}", .failed.len(), .failed.join(", "))]
    UploadFailed {
        completed: usize,
        failed: Vec<String>,
    },

    #[error("Invalid image {path}: {reason}")]
    InvalidImage { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl ApiError {
    /// Whether a retry could succeed without caller intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::StorageError(StorageError::IoError(err))
    }
}

fn summarize_errors(errors: &[serde_json::Value]) -> String {
    let messages: Vec<String> = errors
        .iter()
        .map(|e| {
            e.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
        .collect();
    messages.join("; ")
}
