//! Connection
//!
//! Wraps a `Transport` with the retry policy and GraphQL response handling.
//! A connection is cheap to clone; clones share the transport and the set of
//! field paths the server has been seen to fail on.

use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::query::{Operation, Selection};
use crate::transport::{RetryPolicy, Transport};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Server message for a null in a non-nullable position. The offending field
/// is excluded from later selections of the same type.
const NON_NULLABLE_MESSAGE: &str = "Cannot return null for non-nullable field";

/// Upper bound on exclusions learned while answering a single query.
const MAX_EXCLUSION_RETRIES: usize = 16;

struct Inner {
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    problematic: RwLock<HashMap<&'static str, Vec<String>>>,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_retry(transport, RetryPolicy::default())
    }

    pub fn with_retry(transport: impl Transport + 'static, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                retry,
                problematic: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Field paths excluded from selections of `type_name`.
    pub fn problematic_paths(&self, type_name: &str) -> Vec<String> {
        self.inner
            .problematic
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Executes `operation` and returns the `data` object of the response.
    pub fn query(&self, operation: &Operation) -> Result<Value, ApiError> {
        let mut learned = 0;
        loop {
            let prepared = self.apply_exclusions(operation);
            let document = prepared.render();
            let variables = prepared.variables();

            let response = self.execute_raw(&document, &variables)?;
            match extract_data(&document, response) {
                Ok(data) => return Ok(data),
                Err(ApiError::Server { document, errors }) => {
                    if learned < MAX_EXCLUSION_RETRIES && self.learn_exclusions(operation, &errors) {
                        learned += 1;
                        continue;
                    }
                    return Err(ApiError::Server { document, errors });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes a raw document with retries on transient failures.
    pub fn execute_raw(&self, document: &str, variables: &Value) -> Result<Value, ApiError> {
        debug!(document, "GraphQL request");
        self.inner
            .retry
            .run("graphql", || self.inner.transport.execute(document, variables))
    }

    fn apply_exclusions(&self, operation: &Operation) -> Operation {
        let problematic = self.inner.problematic.read();
        if problematic.is_empty() {
            return operation.clone();
        }

        let mut prepared = operation.clone();
        for root in &mut prepared.roots {
            if let Some(selection) = &mut root.selection {
                if let Some(paths) = problematic.get(selection.ty.name) {
                    let mut excluded = FieldRequest::new();
                    for path in paths {
                        // Paths were validated when they were learned.
                        let _ = excluded.exclude(path);
                    }
                    *selection = Selection {
                        ty: selection.ty,
                        fields: selection.fields.merged_with(&excluded),
                    };
                }
            }
        }
        prepared
    }

    /// Records non-nullable failures as exclusions; returns whether anything
    /// new was learned.
    fn learn_exclusions(&self, operation: &Operation, errors: &[Value]) -> bool {
        let mut learned = false;
        for error in errors {
            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
            if !message.contains(NON_NULLABLE_MESSAGE) {
                continue;
            }
            let Some(path) = error.get("path").and_then(Value::as_array) else {
                continue;
            };
            let Some(root_key) = path.first().and_then(Value::as_str) else {
                continue;
            };
            let Some(root) = operation.roots.iter().find(|r| r.response_key() == root_key) else {
                continue;
            };
            let Some(selection) = &root.selection else {
                continue;
            };

            let field_path: Vec<&str> = path[1..].iter().filter_map(Value::as_str).collect();
            if field_path.is_empty() {
                continue;
            }
            let field_path = field_path.join(".");
            if crate::fields::FieldPath::parse(&field_path).is_err() {
                continue;
            }

            let mut problematic = self.inner.problematic.write();
            let paths = problematic.entry(selection.ty.name).or_default();
            if !paths.contains(&field_path) {
                warn!(
                    type_name = selection.ty.name,
                    path = %field_path,
                    "Excluding field the server cannot return"
                );
                paths.push(field_path);
                learned = true;
            }
        }
        learned
    }
}

fn extract_data(document: &str, mut response: Value) -> Result<Value, ApiError> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(ApiError::Server {
                document: document.to_string(),
                errors: errors.clone(),
            });
        }
    }
    match response.get_mut("data").map(Value::take) {
        Some(data @ Value::Object(_)) => Ok(data),
        _ => Err(ApiError::MalformedQuery(
            "Response contains no data object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RootField;
    use crate::schema::DATASET;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_query_returns_data() {
        let conn = Connection::new(|_doc: &str, _vars: &Value| -> Result<Value, ApiError> {
            Ok(json!({"data": {"generateId": "abc"}}))
        });
        let data = conn
            .query(&Operation::mutation(RootField::new("generateId")))
            .unwrap();
        assert_eq!(data["generateId"], "abc");
    }

    #[test]
    fn test_graphql_errors_become_server_errors() {
        let conn = Connection::new(|_doc: &str, _vars: &Value| -> Result<Value, ApiError> {
            Ok(json!({"errors": [{"message": "Not authorized"}], "data": null}))
        });
        let err = conn
            .query(&Operation::mutation(RootField::new("generateId")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transport_failures_are_retried() {
        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();
        let conn = Connection::with_retry(
            move |_doc: &str, _vars: &Value| -> Result<Value, ApiError> {
                let mut n = counter.lock();
                *n += 1;
                if *n < 3 {
                    Err(ApiError::Transport("reset".into()))
                } else {
                    Ok(json!({"data": {"generateId": "x"}}))
                }
            },
            RetryPolicy::new(5, Duration::ZERO),
        );
        conn.query(&Operation::mutation(RootField::new("generateId")))
            .unwrap();
        assert_eq!(*attempts.lock(), 3);
    }

    #[test]
    fn test_non_nullable_failure_excludes_field_and_retries() {
        let documents = Arc::new(Mutex::new(Vec::new()));
        let seen = documents.clone();
        let conn = Connection::new(move |doc: &str, _vars: &Value| -> Result<Value, ApiError> {
            seen.lock().push(doc.to_string());
            if doc.contains("owner") {
                Ok(json!({
                    "errors": [{
                        "message": "Cannot return null for non-nullable field Dataset.owner.",
                        "path": ["dataset", "owner"]
                    }],
                    "data": null
                }))
            } else {
                Ok(json!({"data": {"dataset": {"id": "d1", "name": "cars"}}}))
            }
        });

        let op = Operation::query(
            RootField::new("dataset")
                .arg("id", "ID!", json!("d1"))
                .select(&DATASET, FieldRequest::create(["name", "owner"]).unwrap()),
        );
        let data = conn.query(&op).unwrap();
        assert_eq!(data["dataset"]["name"], "cars");
        assert_eq!(documents.lock().len(), 2);
        assert_eq!(conn.problematic_paths("Dataset"), vec!["owner".to_string()]);

        // Later queries skip the field up front.
        conn.query(&op).unwrap();
        assert_eq!(documents.lock().len(), 3);
    }
}
