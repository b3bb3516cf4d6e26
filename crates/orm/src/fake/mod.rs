//! In-memory connection
//!
//! `MemoryConnection` keeps rows per source in memory and logs every
//! operation it receives, so tests can check what reached the datasource
//! (one fetch per relation, one truncate per delete).

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::connection::Connection;
use crate::document::Document;
use crate::error::{OrmError, OrmResult};
use crate::query::{FetchOptions, OrderDirection};
use crate::schema::{FieldExtractor, Schema};
use crate::value::{Map, Value};

/// An operation received by a [`MemoryConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Query { source: String, options: FetchOptions },
    Insert { source: String, rows: usize },
    Update { source: String, rows: usize },
    Truncate { source: String, conditions: Map },
}

impl Operation {
    pub fn source(&self) -> &str {
        match self {
            Operation::Query { source, .. }
            | Operation::Insert { source, .. }
            | Operation::Update { source, .. }
            | Operation::Truncate { source, .. } => source,
        }
    }
}

/// Rows kept in memory, keyed by source
#[derive(Debug)]
pub struct MemoryConnection {
    key: String,
    tables: Mutex<IndexMap<String, Vec<Map>>>,
    serials: Mutex<HashMap<String, i64>>,
    log: Mutex<Vec<Operation>>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::with_key("id")
    }

    /// A connection whose rows are identified by `key`
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tables: Mutex::new(IndexMap::new()),
            serials: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Add raw rows to `source`, without logging
    pub fn seed(&self, source: &str, rows: Vec<serde_json::Value>) {
        let mut highest = 0;
        let mut tables = self.tables.lock();
        let table = tables.entry(source.to_string()).or_default();
        for row in rows {
            if let Value::Object(row) = Value::from(row) {
                if let Some(id) = row.get(&self.key).and_then(Value::as_i64) {
                    highest = highest.max(id);
                }
                table.push(row);
            }
        }
        let mut serials = self.serials.lock();
        let serial = serials.entry(source.to_string()).or_default();
        *serial = (*serial).max(highest);
    }

    /// Current rows of `source`
    pub fn rows(&self, source: &str) -> Vec<Map> {
        self.tables.lock().get(source).cloned().unwrap_or_default()
    }

    /// Row of `source` with the given key
    pub fn row(&self, source: &str, id: impl Into<Value>) -> Option<Map> {
        let id = id.into().key_string()?;
        self.rows(source)
            .into_iter()
            .find(|row| row.get(&self.key).and_then(Value::key_string).as_deref() == Some(id.as_str()))
    }

    /// Every operation received so far
    pub fn operations(&self) -> Vec<Operation> {
        self.log.lock().clone()
    }

    /// Number of queries received for `source`
    pub fn fetches(&self, source: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|op| matches!(op, Operation::Query { .. }) && op.source() == source)
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, operation: Operation) {
        tracing::trace!("Memory connection received {:?}", operation);
        self.log.lock().push(operation);
    }

    fn next_id(&self, source: &str) -> i64 {
        let mut serials = self.serials.lock();
        let serial = serials.entry(source.to_string()).or_default();
        *serial += 1;
        *serial
    }

    fn matching(&self, source: &str, conditions: &Map) -> Vec<Map> {
        self.rows(source)
            .into_iter()
            .filter(|row| row_matches(row, conditions))
            .collect()
    }
}

/// Equality on every condition, a list matches any of its entries
fn row_matches(row: &Map, conditions: &Map) -> bool {
    conditions.iter().all(|(field, expected)| {
        let actual = row.get(field).cloned().unwrap_or_default();
        match expected {
            Value::Array(candidates) => candidates.iter().any(|candidate| same_key(&actual, candidate)),
            Value::Null => actual.is_null(),
            other => same_key(&actual, other),
        }
    })
}

fn same_key(a: &Value, b: &Value) -> bool {
    match (a.key_string(), b.key_string()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&self, source: &str, options: &FetchOptions) -> OrmResult<Vec<Map>> {
        self.record(Operation::Query {
            source: source.to_string(),
            options: options.clone(),
        });
        let mut rows = self.matching(source, &options.conditions);
        if !options.order.is_empty() {
            rows.sort_by(|a, b| {
                for (field, direction) in &options.order {
                    let ordering = compare(a.get(field), b.get(field));
                    let ordering = match direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        let rows = rows
            .into_iter()
            .skip(options.offset.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX));
        if options.fields.is_empty() {
            return Ok(rows.collect());
        }
        Ok(rows
            .map(|row| {
                row.into_iter()
                    .filter(|(field, _)| *field == self.key || options.fields.contains(field))
                    .collect()
            })
            .collect())
    }

    async fn count(&self, source: &str, options: &FetchOptions) -> OrmResult<usize> {
        Ok(self.matching(source, &options.conditions).len())
    }

    async fn bulk_insert(&self, schema: &Schema, entities: &[Document], fields: &FieldExtractor) -> OrmResult<bool> {
        let source = schema.source();
        let mut taken: Vec<String> = self
            .rows(source)
            .iter()
            .filter_map(|row| row.get(schema.key()).and_then(Value::key_string))
            .collect();
        let mut inserted = Vec::with_capacity(entities.len());
        for entity in entities {
            let mut row = fields(entity)?;
            let id = match row.get(schema.key()) {
                Some(id) if !id.is_null() => {
                    let key = id.key_string().unwrap_or_default();
                    if taken.contains(&key) {
                        return Err(OrmError::Connection(format!(
                            "duplicate key `{key}` for `{source}`"
                        )));
                    }
                    taken.push(key);
                    id.clone()
                }
                _ => Value::Integer(self.next_id(source)),
            };
            row.insert(schema.key().to_string(), id.clone());
            inserted.push((entity, row, id));
        }
        self.record(Operation::Insert {
            source: source.to_string(),
            rows: inserted.len(),
        });
        {
            let mut tables = self.tables.lock();
            let table = tables.entry(source.to_string()).or_default();
            table.extend(inserted.iter().map(|(_, row, _)| row.clone()));
        }
        for (entity, _, id) in inserted {
            entity.sync(id, None, true)?;
        }
        Ok(true)
    }

    async fn bulk_update(&self, schema: &Schema, entities: &[Document], fields: &FieldExtractor) -> OrmResult<bool> {
        let source = schema.source();
        let mut updates = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity.id();
            let Some(key) = id.key_string() else {
                return Err(OrmError::MissingPrimaryKey(schema.name().to_string()));
            };
            updates.push((key, fields(entity)?));
        }
        self.record(Operation::Update {
            source: source.to_string(),
            rows: updates.len(),
        });
        let mut tables = self.tables.lock();
        let table = tables.entry(source.to_string()).or_default();
        for (key, values) in updates {
            let row = table
                .iter_mut()
                .find(|row| row.get(schema.key()).and_then(Value::key_string).as_deref() == Some(key.as_str()))
                .ok_or_else(|| OrmError::NotFound {
                    model: schema.name().to_string(),
                    id: key.clone(),
                })?;
            for (field, value) in values {
                row.insert(field, value);
            }
        }
        Ok(true)
    }

    async fn truncate(&self, source: &str, conditions: &Map) -> OrmResult<bool> {
        self.record(Operation::Truncate {
            source: source.to_string(),
            conditions: conditions.clone(),
        });
        if let Some(table) = self.tables.lock().get_mut(source) {
            table.retain(|row| !row_matches(row, conditions));
        }
        Ok(true)
    }
}
