//! Transport layer
//!
//! The core only needs a synchronous `execute(document, variables)` capability.
//! `HttpTransport` provides it over HTTP with reqwest, driving the async client
//! on a private tokio runtime.

use crate::error::ApiError;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Executes GraphQL documents against the remote and returns the raw response
/// body (`{"data": ..., "errors": ...}`).
pub trait Transport: Send + Sync {
    fn execute(&self, document: &str, variables: &Value) -> Result<Value, ApiError>;
}

impl<F> Transport for F
where
    F: Fn(&str, &Value) -> Result<Value, ApiError> + Send + Sync,
{
    fn execute(&self, document: &str, variables: &Value) -> Result<Value, ApiError> {
        self(document, variables)
    }
}

/// Bounded retry policy for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Runs `op`, retrying while it fails with a transient error.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    debug!(what, attempt, error = %e, "Transient failure, retrying");
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_http_client() -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime, ApiError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create async runtime: {}", e)))
}

/// Maps reqwest failures onto the error taxonomy: network trouble is
/// transient, everything else is a protocol failure.
pub(crate) fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::Transport(format!("Connection error: {}", error))
    } else if error.is_request() || error.is_body() {
        ApiError::Transport(format!("Request failed: {}", error))
    } else {
        ApiError::MalformedQuery(format!("HTTP error: {}", error))
    }
}

/// Normalizes a server URL to its GraphQL endpoint.
pub fn to_graphql_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("graphql") {
        trimmed.to_string()
    } else {
        format!("{}/graphql", trimmed)
    }
}

/// GraphQL over HTTP.
pub struct HttpTransport {
    runtime: tokio::runtime::Runtime,
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(url: &str, api_key: &str) -> Result<Self, ApiError> {
        Ok(Self {
            runtime: build_runtime()?,
            client: build_http_client()?,
            endpoint: to_graphql_url(url),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn execute(&self, document: &str, variables: &Value) -> Result<Value, ApiError> {
        let body = json!({ "query": document, "variables": variables });
        debug!(endpoint = %self.endpoint, "Executing GraphQL document");

        self.runtime.block_on(async {
            let response = self
                .client
                .post(&self.endpoint)
                .header("authorization", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(map_http_error)?;

            let status = response.status();
            if status.is_server_error() {
                return Err(ApiError::Transport(format!(
                    "Server returned status {}",
                    status
                )));
            }

            let text = response.text().await.map_err(map_http_error)?;
            if !status.is_success() {
                return Err(ApiError::Server {
                    document: document.to_string(),
                    errors: vec![json!({ "message": format!("HTTP {}: {}", status, text) })],
                });
            }

            serde_json::from_str(&text).map_err(|e| {
                ApiError::MalformedQuery(format!("Response was not valid JSON: {}", e))
            })
        })
    }
}
