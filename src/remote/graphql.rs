//! Dataset history over GraphQL.

use crate::connection::Connection;
use crate::dataset::Commit;
use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::query::{Operation, RootField};
use crate::remote::{non_linear, DatasetRemote};
use crate::schema::DATASET;
use crate::types::CommitHash;
use serde_json::{json, Value};
use tracing::{debug, info};

pub struct GraphqlRemote {
    conn: Connection,
}

impl GraphqlRemote {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn dataset_fields(&self, dataset_id: &str, fields: &[&str]) -> Result<Value, ApiError> {
        let op = Operation::query(
            RootField::new("dataset")
                .arg("id", "ID!", json!(dataset_id))
                .select(&DATASET, FieldRequest::create(fields)?),
        );
        let mut data = self.conn.query(&op)?;
        match data.get_mut("dataset").map(Value::take) {
            Some(Value::Null) | None => Err(ApiError::InvalidId {
                entity: DATASET.name.to_string(),
                id: dataset_id.to_string(),
            }),
            Some(dataset) => Ok(dataset),
        }
    }
}

fn parse_hash(value: Option<&Value>) -> Result<Option<CommitHash>, ApiError> {
    match value.and_then(Value::as_str) {
        None | Some("") => Ok(None),
        Some(hex) => hex
            .parse()
            .map(Some)
            .map_err(ApiError::MalformedQuery),
    }
}

impl DatasetRemote for GraphqlRemote {
    fn head(&self, dataset_id: &str) -> Result<Option<CommitHash>, ApiError> {
        let dataset = self.dataset_fields(dataset_id, &["repository.master"])?;
        parse_hash(dataset.get("repository").and_then(|r| r.get("master")))
    }

    fn fetch_commit(&self, dataset_id: &str, hash: &CommitHash) -> Result<Commit, ApiError> {
        let op = Operation::query(
            RootField::new("datasetCommit")
                .arg("datasetId", "ID!", json!(dataset_id))
                .arg("commitHash", "String!", json!(hash.to_hex())),
        );
        let mut data = self.conn.query(&op)?;
        let value = data
            .get_mut("datasetCommit")
            .map(Value::take)
            .unwrap_or(Value::Null);
        if value.is_null() {
            return Err(ApiError::CommitNotFound(hash.to_hex()));
        }
        let commit: Commit = serde_json::from_value(value)
            .map_err(|e| ApiError::MalformedQuery(format!("Invalid commit {}: {}", hash, e)))?;
        commit.verify()?;
        Ok(commit)
    }

    fn push_commits(
        &self,
        dataset_id: &str,
        expected_head: Option<CommitHash>,
        commits: &[Commit],
    ) -> Result<CommitHash, ApiError> {
        let payload = serde_json::to_value(commits)
            .map_err(|e| ApiError::MalformedQuery(format!("Failed to encode commits: {}", e)))?;
        let op = Operation::mutation(
            RootField::new("pushDatasetCommits")
                .arg("datasetId", "ID!", json!(dataset_id))
                .arg("expectedHead", "String", json!(expected_head.map(|h| h.to_hex())))
                .arg("commits", "JSON!", payload),
        );
        debug!(dataset_id, commits = commits.len(), "Pushing commits");
        let data = self.conn.query(&op)?;

        // A null result means the server head moved since `expected_head`.
        match parse_hash(data.get("pushDatasetCommits"))? {
            Some(head) => {
                info!(dataset_id, head = %head.short(), "Remote head advanced");
                Ok(head)
            }
            None => {
                let current = self.head(dataset_id)?;
                let local = commits.last().map(|c| c.hash);
                Err(non_linear(local.as_ref(), current.as_ref()))
            }
        }
    }

    fn commit_state(&self, dataset_id: &str) -> Result<String, ApiError> {
        let dataset = self.dataset_fields(dataset_id, &["gitCommitState"])?;
        Ok(dataset
            .get("gitCommitState")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn generate_id(&self) -> Result<String, ApiError> {
        let data = self
            .conn
            .query(&Operation::mutation(RootField::new("generateId")))?;
        data.get("generateId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::MalformedQuery("generateId returned no id".to_string()))
    }
}
