//! Blob transfers over HTTP
//!
//! Blobs live at `<url>/dvc/<hh>/<rest>`. Uploads are retried on 502 with a
//! delay that grows with each attempt.

use crate::error::ApiError;
use crate::remote::BlobStore;
use crate::transport::{build_http_client, build_runtime, map_http_error};
use crate::types::ContentHash;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts per upload before a 502 is surfaced.
pub const DEFAULT_UPLOAD_TRIES: u32 = 5;

pub struct HttpBlobStore {
    runtime: tokio::runtime::Runtime,
    client: Client,
    base_url: String,
    api_key: String,
    tries: u32,
    retry_delay: Duration,
}

impl HttpBlobStore {
    pub fn new(url: &str, api_key: &str) -> Result<Self, ApiError> {
        Ok(Self {
            runtime: build_runtime()?,
            client: build_http_client()?,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            tries: DEFAULT_UPLOAD_TRIES,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_tries(mut self, tries: u32, retry_delay: Duration) -> Self {
        self.tries = tries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// URL of a blob.
    pub fn blob_url(&self, hash: &ContentHash) -> String {
        let (dir, rest) = hash.fanout();
        format!("{}/dvc/{}/{}", self.base_url, dir, rest)
    }

    fn status_error(&self, what: &str, status: StatusCode) -> ApiError {
        if status.is_server_error() {
            ApiError::Transport(format!("{} failed with status {}", what, status))
        } else {
            ApiError::Server {
                document: what.to_string(),
                errors: vec![serde_json::json!({
                    "message": format!("HTTP {}", status)
                })],
            }
        }
    }
}

impl BlobStore for HttpBlobStore {
    fn exists(&self, hashes: &[ContentHash]) -> Result<Vec<bool>, ApiError> {
        self.runtime.block_on(async {
            let mut found = Vec::with_capacity(hashes.len());
            for hash in hashes {
                let response = self
                    .client
                    .head(self.blob_url(hash))
                    .header("authorization", &self.api_key)
                    .send()
                    .await
                    .map_err(map_http_error)?;
                match response.status() {
                    s if s.is_success() => found.push(true),
                    StatusCode::NOT_FOUND => found.push(false),
                    s => return Err(self.status_error("Blob lookup", s)),
                }
            }
            Ok(found)
        })
    }

    fn upload(&self, hash: &ContentHash, bytes: &[u8], filename: &str) -> Result<(), ApiError> {
        let url = self.blob_url(hash);
        info!(filename, hash = %hash.short(), "Uploading");

        self.runtime.block_on(async {
            let mut attempt = 1;
            loop {
                let response = self
                    .client
                    .put(&url)
                    .header("authorization", &self.api_key)
                    .header("Content-Type", "image/jpeg")
                    .header("x-amz-meta-originalfilename", filename)
                    .body(bytes.to_vec())
                    .send()
                    .await
                    .map_err(map_http_error)?;

                let status = response.status();
                if status == StatusCode::BAD_GATEWAY && attempt < self.tries {
                    warn!(filename, attempt, "Bad gateway, retrying upload");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                    continue;
                }
                if !status.is_success() {
                    return Err(self.status_error("Upload", status));
                }
                debug!(filename, attempts = attempt, "Upload complete");
                return Ok(());
            }
        })
    }

    fn download(&self, hash: &ContentHash) -> Result<Vec<u8>, ApiError> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get(self.blob_url(hash))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(map_http_error)?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(ApiError::InvalidId {
                    entity: "blob".to_string(),
                    id: hash.to_hex(),
                });
            }
            if !status.is_success() {
                return Err(self.status_error("Download", status));
            }
            let bytes = response.bytes().await.map_err(map_http_error)?;
            Ok(bytes.to_vec())
        })
    }
}
