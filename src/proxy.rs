//! Type proxies
//!
//! A `TypeProxy` is a partially-fetched remote object: the entity descriptor,
//! the object id and whatever fields have been fetched so far. Accessors go
//! through [`TypeProxy::require`], which fetches missing fields in a single
//! round trip and never re-fetches or discards populated data.

use crate::connection::Connection;
use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::query::{Operation, RootField};
use crate::schema::{
    EntityDescriptor, FieldType, TypeDef, COLLECTIONS, DATASETS, DATASET_FRAMES, FRAMES, IMAGES,
    PROJECTS, VIDEOS,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::debug;

#[derive(Clone)]
pub struct TypeProxy {
    conn: Connection,
    entity: &'static EntityDescriptor,
    id: String,
    fields: Map<String, Value>,
    generation: u64,
}

impl fmt::Debug for TypeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeProxy")
            .field("type", &self.entity.name())
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Two proxies are the same logical entity when type and id agree.
impl PartialEq for TypeProxy {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.entity, other.entity) && self.id == other.id
    }
}

impl TypeProxy {
    /// Unpopulated stub for a known id.
    pub fn from_id(conn: Connection, entity: &'static EntityDescriptor, id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.to_string()));
        Self {
            conn,
            entity,
            id: id.to_string(),
            fields,
            generation: 0,
        }
    }

    /// Proxy over an object returned by a prior query.
    pub fn from_json(
        conn: Connection,
        entity: &'static EntityDescriptor,
        json: Value,
    ) -> Result<Self, ApiError> {
        let fields = match json {
            Value::Object(fields) => fields,
            other => {
                return Err(ApiError::MalformedQuery(format!(
                    "Expected a {} object, got {}",
                    entity.name(),
                    other
                )))
            }
        };
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::MalformedQuery(format!("{} object has no id", entity.name()))
            })?
            .to_string();
        Ok(Self {
            conn,
            entity,
            id,
            fields,
            generation: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity(&self) -> &'static EntityDescriptor {
        self.entity
    }

    pub fn type_name(&self) -> &'static str {
        self.entity.name()
    }

    /// Incremented each time `refresh` replaces the fetched data.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether `path` has been fetched. A null on the way counts as fetched;
    /// lists are inspected through their first element.
    pub fn has_field(&self, path: &str) -> bool {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return false;
        };
        match self.fields.get(first) {
            Some(value) => value_has_path(value, segments),
            None => false,
        }
    }

    /// Value at a dotted path, if fetched.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Fetches every field selected by `request` that has not been fetched.
    ///
    /// Performs at most one round trip, and none when nothing is missing.
    pub fn populate(&mut self, request: &FieldRequest) -> Result<(), ApiError> {
        let depth = request.depth();
        let mut missing = Vec::new();
        collect_leaf_paths(self.entity.ty, request, "", 0, depth, &mut |path: &str| {
            if !self.has_field(path) {
                missing.push(path.to_string());
            }
        });
        if missing.is_empty() {
            return Ok(());
        }

        debug!(
            type_name = self.type_name(),
            id = %self.id,
            fields = ?missing,
            "Populating fields"
        );
        let fetch = FieldRequest::create(&missing)?.with_depth(depth);
        let fetched = self.fetch(fetch)?;
        let mut merged = self.fields.clone();
        merge_object(&mut merged, fetched, "")?;
        self.fields = merged;

        for path in &missing {
            if !self.has_field(path) {
                return Err(ApiError::MissingField {
                    field: path.clone(),
                    id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Fetches every declared field that has not been fetched.
    pub fn populate_all(&mut self) -> Result<(), ApiError> {
        self.populate(&FieldRequest::all())
    }

    /// Guard used by accessors: makes sure `fields` are populated.
    pub fn require(&mut self, fields: &[&str]) -> Result<(), ApiError> {
        let request = FieldRequest::create(fields)?;
        self.populate(&request)
    }

    /// Requires `field` and deserializes its value.
    pub fn require_value<T: DeserializeOwned>(&mut self, field: &str) -> Result<T, ApiError> {
        self.require(&[field])?;
        let value = self.get(field).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            ApiError::MalformedQuery(format!(
                "Unexpected value for {}.{} ({}): {}",
                self.type_name(),
                field,
                self.id,
                e
            ))
        })
    }

    /// Re-fetches the fields fetched so far, replacing them.
    pub fn refresh(&mut self) -> Result<(), ApiError> {
        let names: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|name| self.entity.ty.field(name).is_some())
            .collect();
        let request = FieldRequest::create(&names)?.with_depth(crate::fields::DEFAULT_MAX_DEPTH);
        let fetched = self.fetch(request)?;
        self.fields = fetched;
        self.generation += 1;
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    fn fetch(&self, request: FieldRequest) -> Result<Map<String, Value>, ApiError> {
        let root = self.entity.by_id_query;
        let op = Operation::query(
            RootField::new(root)
                .arg("id", "ID!", json!(self.id))
                .select(self.entity.ty, request),
        );
        let mut data = self.conn.query(&op)?;
        match data.get_mut(root).map(Value::take) {
            Some(Value::Object(map)) => Ok(map),
            Some(Value::Null) | None => Err(ApiError::InvalidId {
                entity: self.type_name().to_string(),
                id: self.id.clone(),
            }),
            Some(other) => Err(ApiError::MalformedQuery(format!(
                "Expected an object for {}, got {}",
                root, other
            ))),
        }
    }
}

fn value_has_path<'a>(value: &Value, mut rest: impl Iterator<Item = &'a str>) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => match items.first() {
            Some(first) => value_has_path(first, rest),
            None => true,
        },
        Value::Object(map) => match rest.next() {
            Some(segment) => match map.get(segment) {
                Some(inner) => value_has_path(inner, rest),
                None => false,
            },
            None => true,
        },
        _ => rest.next().is_none(),
    }
}

/// Visits the scalar paths of `ty` that `request` selects, mirroring the
/// selection rendered by the query layer.
fn collect_leaf_paths(
    ty: &TypeDef,
    request: &FieldRequest,
    prefix: &str,
    level: usize,
    max_depth: usize,
    visit: &mut dyn FnMut(&str),
) {
    for field in ty.fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        if !request.should_include_path(&path) {
            continue;
        }
        match field.ty {
            FieldType::Scalar => visit(&path),
            FieldType::Object(inner) if level < max_depth => {
                collect_leaf_paths(inner, request, &path, level + 1, max_depth, visit)
            }
            FieldType::Object(_) => {}
        }
    }
}

/// Merges fetched fields into `target`. Objects merge recursively; any other
/// value that is already present must be unchanged.
fn merge_object(
    target: &mut Map<String, Value>,
    fetched: Map<String, Value>,
    prefix: &str,
) -> Result<(), ApiError> {
    for (key, value) in fetched {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
            }
            Some(Value::Object(existing)) => match value {
                Value::Object(incoming) => merge_object(existing, incoming, &path)?,
                other => {
                    return Err(ApiError::Consistency(format!(
                        "Field '{}' changed from an object to {}",
                        path, other
                    )))
                }
            },
            Some(Value::Array(existing)) => match value {
                Value::Array(incoming) => merge_arrays(existing, incoming, &path)?,
                other => {
                    return Err(ApiError::Consistency(format!(
                        "Field '{}' changed from a list to {}",
                        path, other
                    )))
                }
            },
            Some(existing) => {
                if *existing != value {
                    return Err(ApiError::Consistency(format!(
                        "Field '{}' changed from {} to {}",
                        path, existing, value
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Lists of objects merge element-wise; their lengths must agree.
fn merge_arrays(existing: &mut [Value], incoming: Vec<Value>, path: &str) -> Result<(), ApiError> {
    if existing.len() != incoming.len() {
        return Err(ApiError::Consistency(format!(
            "List '{}' changed length from {} to {}",
            path,
            existing.len(),
            incoming.len()
        )));
    }
    for (slot, value) in existing.iter_mut().zip(incoming) {
        match (slot, value) {
            (Value::Object(target), Value::Object(fetched)) => merge_object(target, fetched, path)?,
            (slot, value) if *slot == value => {}
            (slot, value) => {
                return Err(ApiError::Consistency(format!(
                    "List '{}' element changed from {} to {}",
                    path, slot, value
                )))
            }
        }
    }
    Ok(())
}

/// Generates a typed wrapper around `TypeProxy` with one guarded accessor per
/// listed field.
macro_rules! entity_proxy {
    (
        $(#[$meta:meta])*
        $name:ident => $entity:ident {
            $( $accessor:ident : $ty:ty = $field:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(TypeProxy);

        impl $name {
            pub fn from_id(conn: &Connection, id: &str) -> Self {
                Self(TypeProxy::from_id(conn.clone(), &$entity, id))
            }

            pub fn from_proxy(proxy: TypeProxy) -> Result<Self, ApiError> {
                if !std::ptr::eq(proxy.entity(), &$entity) {
                    return Err(ApiError::Consistency(format!(
                        "Expected a {} proxy, got {}",
                        $entity.name(),
                        proxy.type_name()
                    )));
                }
                Ok(Self(proxy))
            }

            pub fn id(&self) -> &str {
                self.0.id()
            }

            pub fn proxy(&self) -> &TypeProxy {
                &self.0
            }

            pub fn proxy_mut(&mut self) -> &mut TypeProxy {
                &mut self.0
            }

            pub fn into_proxy(self) -> TypeProxy {
                self.0
            }

            $(
                pub fn $accessor(&mut self) -> Result<$ty, ApiError> {
                    self.0.require_value($field)
                }
            )*
        }
    };
}

entity_proxy! {
    /// A remote dataset.
    Dataset => DATASETS {
        name: String = "name",
        description: Option<String> = "description",
        owner: Option<String> = "owner",
        tags: Option<Vec<String>> = "tags",
        frame_count: Option<u64> = "frameCount",
        video_count: Option<u64> = "videoCount",
        git_commit_state: Option<String> = "gitCommitState",
        repository_master: Option<String> = "repository.master",
    }
}

entity_proxy! {
    Collection => COLLECTIONS {
        name: String = "name",
        path: Option<String> = "path",
        parent_id: Option<String> = "parentId",
        child_ids: Option<Vec<String>> = "childIds",
        description: Option<String> = "description",
    }
}

entity_proxy! {
    Video => VIDEOS {
        name: Option<String> = "name",
        filename: Option<String> = "filename",
        state: Option<String> = "state",
        frame_count: Option<u64> = "frameCount",
        url: Option<String> = "url",
    }
}

entity_proxy! {
    Image => IMAGES {
        name: Option<String> = "name",
        filename: Option<String> = "filename",
        state: Option<String> = "state",
        width: Option<u32> = "width",
        height: Option<u32> = "height",
    }
}

entity_proxy! {
    Frame => FRAMES {
        video_id: Option<String> = "videoId",
        frame_index: Option<u64> = "frameIndex",
        content_hash: Option<String> = "contentHash",
        width: Option<u32> = "width",
        height: Option<u32> = "height",
    }
}

entity_proxy! {
    /// A frame as it appears inside a dataset.
    DatasetFrame => DATASET_FRAMES {
        frame_id: Option<String> = "frameId",
        content_hash: Option<String> = "contentHash",
        frame_index: Option<u64> = "videoMetadata.frameIndex",
        video_id: Option<String> = "videoMetadata.videoId",
        width: Option<u32> = "width",
        height: Option<u32> = "height",
    }
}

entity_proxy! {
    Project => PROJECTS {
        name: String = "name",
        root_collection_id: Option<String> = "rootCollectionId",
    }
}
