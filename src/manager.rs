//! Entity managers
//!
//! One `Manager` serves every entity type. What it may do is decided by the
//! descriptor's capabilities rather than by the type.

use crate::connection::Connection;
use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::paginated::PaginatedQuery;
use crate::processing::wait_until;
use crate::proxy::TypeProxy;
use crate::query::{Operation, RootField};
use crate::schema::EntityDescriptor;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Processing state reported once media is ready.
pub const COMPLETED_STATE: &str = "completed";

#[derive(Debug, Clone)]
pub struct Manager {
    conn: Connection,
    entity: &'static EntityDescriptor,
}

impl Manager {
    pub fn new(conn: Connection, entity: &'static EntityDescriptor) -> Self {
        Self { conn, entity }
    }

    pub fn entity(&self) -> &'static EntityDescriptor {
        self.entity
    }

    fn unsupported(&self, capability: &str) -> ApiError {
        ApiError::Unsupported {
            entity: self.entity.name().to_string(),
            capability: capability.to_string(),
        }
    }

    fn require_queryable(&self) -> Result<(), ApiError> {
        if self.entity.capabilities.queryable {
            Ok(())
        } else {
            Err(self.unsupported("query"))
        }
    }

    /// The descriptor's default selection.
    pub fn default_fields(&self) -> Result<FieldRequest, ApiError> {
        FieldRequest::new().with_defaults(self.entity.default_fields)
    }

    /// Unpopulated proxy; no request is made.
    pub fn from_id(&self, id: &str) -> Result<TypeProxy, ApiError> {
        self.require_queryable()?;
        Ok(TypeProxy::from_id(self.conn.clone(), self.entity, id))
    }

    /// Proxy populated with `fields` (the defaults when `None`).
    pub fn fetch(&self, id: &str, fields: Option<&FieldRequest>) -> Result<TypeProxy, ApiError> {
        let mut proxy = self.from_id(id)?;
        match fields {
            Some(fields) => proxy.populate(fields)?,
            None => proxy.populate(&self.default_fields()?)?,
        }
        Ok(proxy)
    }

    pub fn id_exists(&self, id: &str) -> Result<bool, ApiError> {
        self.require_queryable()?;
        let root = self.entity.by_id_query;
        let op = Operation::query(
            RootField::new(root)
                .arg("id", "ID!", json!(id))
                .select(self.entity.ty, FieldRequest::create(["id"])?),
        );
        match self.conn.query(&op) {
            Ok(data) => Ok(data.get(root).is_some_and(|v| !v.is_null())),
            Err(ApiError::Server { errors, .. }) if mentions_not_found(&errors) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn search(&self, search_text: &str) -> Result<PaginatedQuery, ApiError> {
        self.require_queryable()?;
        Ok(PaginatedQuery::new(self.conn.clone(), self.entity, search_text)?
            .with_fields(self.default_fields()?))
    }

    pub fn all(&self) -> Result<PaginatedQuery, ApiError> {
        self.search("")
    }

    pub fn count(&self, search_text: &str) -> Result<u64, ApiError> {
        self.search(search_text)?.count()
    }

    /// The single object whose name is exactly `name`.
    pub fn from_name(&self, name: &str) -> Result<TypeProxy, ApiError> {
        let query = self
            .search(&format!("name:\"{}\"", name))?
            .with_fields(FieldRequest::create(["name"])?);

        let mut matches = Vec::new();
        for item in query.iter() {
            let item = item?;
            if item.get("name").and_then(Value::as_str) == Some(name) {
                matches.push(item);
            }
        }
        match matches.len() {
            0 => Err(ApiError::InvalidId {
                entity: self.entity.name().to_string(),
                id: name.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(ApiError::AmbiguousIdentifier(name.to_string())),
        }
    }

    /// Resolves an id, falling back to an exact name lookup.
    pub fn from_string(&self, identifier: &str) -> Result<TypeProxy, ApiError> {
        if self.id_exists(identifier)? {
            return self.from_id(identifier);
        }
        if self.entity.capabilities.searchable {
            return self.from_name(identifier);
        }
        Err(ApiError::InvalidId {
            entity: self.entity.name().to_string(),
            id: identifier.to_string(),
        })
    }

    pub fn create(&self, name: &str) -> Result<TypeProxy, ApiError> {
        let mutation = match self.entity.create_mutation {
            Some(m) if self.entity.capabilities.creatable => m,
            _ => return Err(self.unsupported("create")),
        };
        let op = Operation::mutation(
            RootField::new(mutation)
                .arg("name", "String!", json!(name))
                .select(self.entity.ty, self.default_fields()?),
        );
        let mut data = self.conn.query(&op)?;
        let created = data.get_mut(mutation).map(Value::take).unwrap_or(Value::Null);
        let proxy = TypeProxy::from_json(self.conn.clone(), self.entity, created)?;
        info!(type_name = self.entity.name(), id = proxy.id(), name, "Created");
        Ok(proxy)
    }

    /// Waits until every id reports the completed processing state.
    pub fn wait_for_processing(
        &self,
        ids: &[String],
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ApiError> {
        if !self.entity.ty.has_path("state") {
            return Err(self.unsupported("processing state"));
        }
        let what = format!("{} {} to finish processing", ids.len(), self.entity.name());
        let mut pending: Vec<String> = ids.to_vec();
        wait_until(&what, timeout, interval, || {
            let mut still_pending = Vec::new();
            for id in &pending {
                let mut proxy = self.from_id(id)?;
                let state: Option<String> = proxy.require_value("state")?;
                if state.as_deref() != Some(COMPLETED_STATE) {
                    still_pending.push(id.clone());
                }
            }
            pending = still_pending;
            Ok(pending.is_empty())
        })
    }
}

fn mentions_not_found(errors: &[Value]) -> bool {
    errors.iter().any(|e| {
        e.get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.to_ascii_lowercase().contains("not found"))
    })
}
