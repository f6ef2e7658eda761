//! Client facade
//!
//! `Conservator` wires a resolved config to a connection, the entity
//! managers and the remotes used by local datasets.

use crate::config::ConservatorConfig;
use crate::connection::Connection;
use crate::dataset::{LocalDataset, SyncContext};
use crate::error::ApiError;
use crate::manager::Manager;
use crate::remote::{BlobStore, DatasetRemote, GraphqlRemote, HttpBlobStore};
use crate::schema::{
    entity_by_name, COLLECTIONS, DATASETS, DATASET_FRAMES, ENTITIES, FRAMES, IMAGES, PROJECTS,
    VIDEOS,
};
use crate::transport::{HttpTransport, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Conservator {
    config: ConservatorConfig,
    conn: Connection,
    remote: Arc<dyn DatasetRemote>,
    blobs: Arc<dyn BlobStore>,
}

impl Conservator {
    /// Connects over HTTP using `config`.
    pub fn connect(config: ConservatorConfig) -> Result<Self, ApiError> {
        config.ensure_valid()?;
        let api_key = config.api_key()?.to_string();
        let transport = HttpTransport::new(&config.url, &api_key)?;
        info!(endpoint = transport.endpoint(), "Connecting");

        let retry = RetryPolicy::new(config.max_retries, Duration::from_secs(1));
        let conn = Connection::with_retry(transport, retry);
        let remote = Arc::new(GraphqlRemote::new(conn.clone()));
        let blobs = Arc::new(HttpBlobStore::new(&config.url, &api_key)?);
        Ok(Self::with_parts(config, conn, remote, blobs))
    }

    /// Facade over already-built parts.
    pub fn with_parts(
        config: ConservatorConfig,
        conn: Connection,
        remote: Arc<dyn DatasetRemote>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            conn,
            remote,
            blobs,
        }
    }

    pub fn config(&self) -> &ConservatorConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn datasets(&self) -> Manager {
        Manager::new(self.conn.clone(), &DATASETS)
    }

    pub fn collections(&self) -> Manager {
        Manager::new(self.conn.clone(), &COLLECTIONS)
    }

    pub fn videos(&self) -> Manager {
        Manager::new(self.conn.clone(), &VIDEOS)
    }

    pub fn images(&self) -> Manager {
        Manager::new(self.conn.clone(), &IMAGES)
    }

    pub fn frames(&self) -> Manager {
        Manager::new(self.conn.clone(), &FRAMES)
    }

    pub fn dataset_frames(&self) -> Manager {
        Manager::new(self.conn.clone(), &DATASET_FRAMES)
    }

    pub fn projects(&self) -> Manager {
        Manager::new(self.conn.clone(), &PROJECTS)
    }

    /// Manager for an entity by type or collection name, e.g. `datasets`.
    pub fn manager(&self, entity: &str) -> Result<Manager, ApiError> {
        let descriptor = entity_by_name(entity).ok_or_else(|| {
            let known: Vec<&str> = ENTITIES.iter().map(|e| e.name()).collect();
            ApiError::InvalidId {
                entity: format!("entity type (one of {})", known.join(", ")),
                id: entity.to_string(),
            }
        })?;
        Ok(Manager::new(self.conn.clone(), descriptor))
    }

    /// Sync context for a working copy at `root`.
    pub fn sync_context(&self, root: &Path) -> SyncContext {
        SyncContext::new(
            self.remote.clone(),
            self.blobs.clone(),
            self.config.resolved_cache_path(root),
            self.config.worker_count(),
        )
    }

    /// Clones the dataset named or identified by `identifier` into `path`.
    pub fn clone_dataset(&self, identifier: &str, path: &Path) -> Result<LocalDataset, ApiError> {
        let dataset = self.datasets().from_string(identifier)?;
        LocalDataset::clone(self.sync_context(path), dataset.id(), path)
    }

    pub fn open_dataset(&self, path: &Path) -> Result<LocalDataset, ApiError> {
        LocalDataset::open(self.sync_context(path), path)
    }

    /// Commit author: the configured email, else `unknown`.
    pub fn author(&self) -> &str {
        self.config.email.as_deref().unwrap_or("unknown")
    }
}
