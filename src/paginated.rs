//! Paginated queries
//!
//! Each page request carries the search arguments plus `page`/`limit` and asks
//! for the total match count in the same document. The total seen on the first
//! page bounds the iteration; any later change aborts it.

use crate::connection::Connection;
use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::proxy::TypeProxy;
use crate::query::{Argument, Operation, RootField};
use crate::schema::EntityDescriptor;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::debug;

/// Largest page the server is asked for.
pub const MAX_PAGE_SIZE: usize = 100;

const ITEMS_KEY: &str = "items";
const TOTAL_KEY: &str = "total";

#[derive(Debug, Clone)]
pub struct PaginatedQuery {
    conn: Connection,
    entity: &'static EntityDescriptor,
    search: &'static str,
    count: &'static str,
    args: Vec<Argument>,
    fields: FieldRequest,
    page_size: usize,
    limit: Option<usize>,
}

impl PaginatedQuery {
    /// Query over the search results of `entity` for `search_text`.
    pub fn new(
        conn: Connection,
        entity: &'static EntityDescriptor,
        search_text: &str,
    ) -> Result<Self, ApiError> {
        let (search, count) = match (entity.search_query, entity.count_query) {
            (Some(search), Some(count)) if entity.capabilities.searchable => (search, count),
            _ => {
                return Err(ApiError::Unsupported {
                    entity: entity.name().to_string(),
                    capability: "search".to_string(),
                })
            }
        };
        Ok(Self {
            conn,
            entity,
            search,
            count,
            args: vec![Argument {
                name: "searchText".to_string(),
                graphql_type: "String".to_string(),
                value: json!(search_text),
            }],
            fields: FieldRequest::new().with_defaults(&["id"])?,
            page_size: MAX_PAGE_SIZE,
            limit: None,
        })
    }

    /// Adds an extra argument passed to both the search and count queries.
    pub fn arg(mut self, name: &str, graphql_type: &str, value: Value) -> Self {
        self.args.push(Argument {
            name: name.to_string(),
            graphql_type: graphql_type.to_string(),
            value,
        });
        self
    }

    /// Stops after `n` items.
    pub fn first(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn with_fields(mut self, fields: FieldRequest) -> Self {
        self.fields = fields;
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    /// Starts a fresh iteration from the first page.
    pub fn iter(&self) -> PageIter<'_> {
        PageIter {
            query: self,
            page: 0,
            total: None,
            yielded: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn first_item(&self) -> Result<Option<TypeProxy>, ApiError> {
        self.iter().next().transpose()
    }

    pub fn collect_all(&self) -> Result<Vec<TypeProxy>, ApiError> {
        self.iter().collect()
    }

    /// Total number of matches, in a single request.
    pub fn count(&self) -> Result<u64, ApiError> {
        let op = Operation::query(self.count_root());
        let data = self.conn.query(&op)?;
        parse_total(&data)
    }

    fn count_root(&self) -> RootField {
        let mut root = RootField::new(self.count).alias(TOTAL_KEY);
        root.args = self.args.clone();
        root
    }

    fn page_operation(&self, page: usize) -> Operation {
        let mut items = RootField::new(self.search).alias(ITEMS_KEY);
        items.args = self.args.clone();
        let items = items
            .arg("page", "Int", json!(page))
            .arg("limit", "Int", json!(self.page_size))
            .select(self.entity.ty, self.fields.clone());
        Operation::query(items).with_root(self.count_root())
    }
}

/// Lazy, forward-only iterator over a `PaginatedQuery`. Fused after the
/// first error.
pub struct PageIter<'a> {
    query: &'a PaginatedQuery,
    page: usize,
    total: Option<u64>,
    yielded: usize,
    buffer: VecDeque<Value>,
    done: bool,
}

impl PageIter<'_> {
    /// Total recorded on the first page, once fetched.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.page
    }

    fn fail(&mut self, error: ApiError) -> Option<Result<TypeProxy, ApiError>> {
        self.done = true;
        self.buffer.clear();
        Some(Err(error))
    }

    fn fetch_page(&mut self) -> Result<(), ApiError> {
        let op = self.query.page_operation(self.page);
        let mut data = self.query.conn.query(&op)?;
        let observed = parse_total(&data)?;

        let total = *self.total.get_or_insert(observed);
        if observed != total {
            return Err(ApiError::ConcurrentQueryModification {
                page: self.page,
                expected: total,
                observed,
            });
        }

        let items = match data.get_mut(ITEMS_KEY).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ApiError::MalformedQuery(format!(
                    "{} response has no item list",
                    self.query.search
                )))
            }
        };

        let offset = (self.page * self.query.page_size) as u64;
        let expected_len = total.saturating_sub(offset).min(self.query.page_size as u64);
        if items.len() as u64 != expected_len {
            return Err(ApiError::ConcurrentQueryModification {
                page: self.page,
                expected: total,
                observed: offset + items.len() as u64,
            });
        }

        debug!(
            query = self.query.search,
            page = self.page,
            items = items.len(),
            total,
            "Fetched page"
        );
        self.page += 1;
        self.buffer.extend(items);
        Ok(())
    }
}

impl Iterator for PageIter<'_> {
    type Item = Result<TypeProxy, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.query.limit.is_some_and(|limit| self.yielded >= limit) {
            self.done = true;
            return None;
        }

        if self.buffer.is_empty() {
            let exhausted = self
                .total
                .is_some_and(|total| self.yielded as u64 >= total);
            if exhausted {
                self.done = true;
                return None;
            }
            if let Err(e) = self.fetch_page() {
                return self.fail(e);
            }
        }

        let Some(item) = self.buffer.pop_front() else {
            self.done = true;
            return None;
        };
        self.yielded += 1;
        match TypeProxy::from_json(self.query.conn.clone(), self.query.entity, item) {
            Ok(proxy) => Some(Ok(proxy)),
            Err(e) => self.fail(e),
        }
    }
}

fn parse_total(data: &Value) -> Result<u64, ApiError> {
    data.get(TOTAL_KEY)
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::MalformedQuery("Response has no total count".to_string()))
}
