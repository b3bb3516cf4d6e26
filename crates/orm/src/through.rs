//! Virtual collection projected through a pivot collection
//!
//! A `Through` view over `(parent, through, using)` exposes
//! `parent.through[i].using` as if it were a plain collection. It owns no
//! storage: reads and writes go through the pivot entities.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::collection::{index_values, Collection};
use crate::document::{export_node, Document, ExportOptions, ModifiedOptions, WeakDocument};
use crate::error::{OrmError, OrmResult};
use crate::graph::NodeId;
use crate::path;
use crate::schema::{CastOptions, Schema};
use crate::value::{Map, Value};

/// Projection of the `using` field of every pivot entity in `through`
#[derive(Clone)]
pub struct Through {
    parent: WeakDocument,
    through: String,
    using: String,
    schema: Arc<Schema>,
}

impl Through {
    /// Build the view and make sure the pivot collection exists on the
    /// parent. When `data` is given it is reconciled with the pivot rows.
    pub fn new(
        parent: &Document,
        through: &str,
        using: &str,
        schema: Arc<Schema>,
        data: Option<Vec<Value>>,
    ) -> OrmResult<Self> {
        if through.is_empty() {
            return Err(OrmError::MissingThrough(schema.name().to_string()));
        }
        if using.is_empty() {
            return Err(OrmError::MissingUsing(schema.name().to_string()));
        }
        let view = Self {
            parent: parent.downgrade(),
            through: through.to_string(),
            using: using.to_string(),
            schema,
        };

        if !parent.has(through)? {
            let pivot = parent.cast_field(through, Value::Array(Vec::new()))?;
            parent.attach_loaded(through, pivot);
        }
        if let Some(data) = data {
            view.merge(data)?;
        }
        Ok(view)
    }

    pub fn parent(&self) -> Option<Document> {
        self.parent.upgrade()
    }

    fn parent_or_err(&self) -> OrmResult<Document> {
        self.parent.upgrade().ok_or(OrmError::Unbound)
    }

    pub fn through(&self) -> &str {
        &self.through
    }

    pub fn using(&self) -> &str {
        &self.using
    }

    /// Target schema of the projected entities
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The pivot collection
    pub fn pivot(&self) -> OrmResult<Collection> {
        match self.parent_or_err()?.get(&self.through)? {
            Value::Collection(pivot) => Ok(pivot),
            other => Err(OrmError::InvalidPathSegment {
                path: self.through.clone(),
                segment: other.type_name().to_string(),
            }),
        }
    }

    /// Whether both views project the same field of the same parent
    pub fn same_view(&self, other: &Through) -> bool {
        self.through == other.through
            && self.using == other.using
            && match (self.parent.upgrade(), other.parent.upgrade()) {
                (Some(a), Some(b)) => a.ptr_eq(&b),
                _ => false,
            }
    }

    fn pivot_schema(&self) -> OrmResult<Arc<Schema>> {
        let parent_schema = self.parent_or_err()?.schema().ok_or(OrmError::Unbound)?;
        parent_schema.relation(&self.through)?.to_schema()
    }

    fn cast_target(&self, data: Value) -> OrmResult<Value> {
        match data {
            Value::Document(_) => Ok(data),
            other => self.schema.cast(None, other, CastOptions::default()),
        }
    }

    /// Wrap a target entity into a new pivot entity keyed on the parent
    fn wrap(&self, data: Value) -> OrmResult<Document> {
        let parent = self.parent_or_err()?;
        let pivot_schema = self.pivot_schema()?;
        let entity = Document::with_schema(&pivot_schema, Value::Object(Map::new()), CastOptions::default())?;

        if parent.exists() {
            let parent_schema = parent.schema().ok_or(OrmError::Unbound)?;
            let conditions = parent_schema.relation(&self.through)?.match_on(&parent)?;
            for (key, value) in conditions {
                entity.set(&key, value)?;
            }
        }
        entity.set(&self.using, self.cast_target(data)?)?;
        Ok(entity)
    }

    /// Reconcile pivot rows with a new list of target entities. Rows whose
    /// target key matches an incoming entity are kept and updated, other
    /// rows are removed, and unmatched entities become new rows.
    pub fn merge(&self, data: Vec<Value>) -> OrmResult<()> {
        let pivot = self.pivot()?;
        let using = self.pivot_schema()?.relation(&self.using)?;
        let (from_key, to_key) = (using.from_key().to_string(), using.to_key().to_string());

        let mut incoming = Vec::with_capacity(data.len());
        for item in data {
            let item = self.cast_target(item)?;
            let key = match &item {
                Value::Document(doc) => doc.get(&to_key)?.key_string(),
                _ => None,
            };
            incoming.push((item, key, false));
        }

        let mut stale = Vec::new();
        for (index, row) in pivot.items().iter().enumerate() {
            let Some(row) = row.as_document() else {
                stale.push(index);
                continue;
            };
            let key = row.get(&from_key)?.key_string();
            let matched = key.and_then(|key| {
                incoming
                    .iter()
                    .position(|(_, candidate, used)| !used && candidate.as_deref() == Some(key.as_str()))
            });
            match matched {
                Some(position) => {
                    incoming[position].2 = true;
                    row.set(&self.using, incoming[position].0.clone())?;
                }
                None => stale.push(index),
            }
        }
        for index in stale.into_iter().rev() {
            pivot.unset(index);
        }
        for (item, _, used) in incoming {
            if !used {
                self.push(item)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> OrmResult<Value> {
        match self.pivot()?.get(index) {
            Some(Value::Document(row)) => row.get(&self.using),
            _ => Ok(Value::Null),
        }
    }

    pub fn set(&self, index: usize, data: impl Into<Value>) -> OrmResult<()> {
        let entity = self.wrap(data.into())?;
        self.pivot()?.set(index, entity)
    }

    pub fn push(&self, data: impl Into<Value>) -> OrmResult<usize> {
        let entity = self.wrap(data.into())?;
        self.pivot()?.push(entity)
    }

    pub fn unset(&self, index: usize) -> OrmResult<Option<Value>> {
        let removed = self.pivot()?.unset(index);
        Ok(match removed {
            Some(Value::Document(row)) => Some(row.get(&self.using)?),
            _ => None,
        })
    }

    pub fn count(&self) -> OrmResult<usize> {
        Ok(self.pivot()?.len())
    }

    pub fn keys(&self) -> OrmResult<Vec<usize>> {
        Ok(self.pivot()?.keys())
    }

    /// Projected entities
    pub fn items(&self) -> OrmResult<Vec<Value>> {
        let mut items = Vec::new();
        for row in self.pivot()?.items() {
            items.push(match row {
                Value::Document(row) => row.get(&self.using)?,
                _ => Value::Null,
            });
        }
        Ok(items)
    }

    pub fn get_path(&self, path: &str) -> OrmResult<Value> {
        let (head, rest) = path::head(path)?;
        let index = path::index(head).ok_or_else(|| OrmError::InvalidPathSegment {
            path: path.to_string(),
            segment: head.to_string(),
        })?;
        let value = self.get(index)?;
        match (value, rest) {
            (value, None) => Ok(value),
            (Value::Document(doc), Some(rest)) => doc.get(rest),
            (Value::Null, Some(_)) => Ok(Value::Null),
            (_, Some(rest)) => Err(OrmError::InvalidPathSegment {
                path: path.to_string(),
                segment: rest.to_string(),
            }),
        }
    }

    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        let index = path::index(head).ok_or_else(|| OrmError::InvalidPathSegment {
            path: path.to_string(),
            segment: head.to_string(),
        })?;
        match rest {
            None => self.set(index, value),
            Some(rest) => match self.get(index)? {
                Value::Document(doc) => doc.set(rest, value),
                _ => Err(OrmError::InvalidPathSegment {
                    path: path.to_string(),
                    segment: head.to_string(),
                }),
            },
        }
    }

    pub fn unset_path(&self, path: &str) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        let Some(index) = path::index(head) else {
            return Ok(());
        };
        match rest {
            None => self.unset(index).map(|_| ()),
            Some(rest) => match self.get(index)? {
                Value::Document(doc) => doc.unset(rest),
                _ => Ok(()),
            },
        }
    }

    pub fn has_path(&self, path: &str) -> OrmResult<bool> {
        let (head, rest) = path::head(path)?;
        let Some(index) = path::index(head) else {
            return Ok(false);
        };
        if index >= self.count()? {
            return Ok(false);
        }
        match (self.get(index)?, rest) {
            (_, None) => Ok(true),
            (Value::Document(doc), Some(rest)) => doc.has(rest),
            _ => Ok(false),
        }
    }

    pub fn index_by(&self, field: &str, by_index: bool) -> OrmResult<indexmap::IndexMap<String, Vec<Value>>> {
        index_values(&self.items()?, field, by_index)
    }

    pub fn index_of(&self, item: &Value, from: usize) -> OrmResult<Option<usize>> {
        Ok(self
            .items()?
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, candidate)| candidate.same(item))
            .map(|(index, _)| index))
    }

    fn collect(&self, items: Vec<Value>) -> Collection {
        let collection = Collection::bound(Some(self.schema.clone()), String::new());
        for item in items {
            collection.insert_item(item);
        }
        collection.snapshot();
        collection
    }

    pub fn slice(&self, start: usize, end: Option<usize>) -> OrmResult<Collection> {
        let items = self.items()?;
        let end = end.unwrap_or(items.len()).min(items.len());
        let start = start.min(end);
        Ok(self.collect(items[start..end].to_vec()))
    }

    pub fn filter<F>(&self, predicate: F) -> OrmResult<Collection>
    where
        F: Fn(&Value) -> bool,
    {
        Ok(self.collect(self.items()?.into_iter().filter(|item| predicate(item)).collect()))
    }

    pub fn map<F>(&self, f: F) -> OrmResult<Collection>
    where
        F: Fn(&Value) -> Value,
    {
        Collection::with_items(self.items()?.iter().map(f).collect())
    }

    pub fn reduce<T, F>(&self, f: F, initial: T) -> OrmResult<T>
    where
        F: Fn(T, &Value) -> T,
    {
        Ok(self.items()?.iter().fold(initial, f))
    }

    pub fn modified(&self) -> bool {
        self.modified_inner(&ModifiedOptions::default(), &mut HashSet::new())
    }

    pub(crate) fn modified_inner(&self, options: &ModifiedOptions, visited: &mut HashSet<NodeId>) -> bool {
        match self.pivot() {
            Ok(pivot) => pivot.modified_inner(options, visited),
            Err(_) => false,
        }
    }

    pub fn amend(&self) -> OrmResult<()> {
        self.pivot()?.amend();
        Ok(())
    }

    pub fn data(&self, options: &ExportOptions) -> OrmResult<serde_json::Value> {
        self.to_inner("array", options, &mut Vec::new())
    }

    pub(crate) fn to_inner(
        &self,
        format: &str,
        options: &ExportOptions,
        ancestors: &mut Vec<NodeId>,
    ) -> OrmResult<serde_json::Value> {
        let mut out = Vec::new();
        for item in self.items()? {
            match item.node() {
                Some(node) if ancestors.contains(&node.id()) => continue,
                Some(node) => out.push(export_node(&node, format, options, ancestors)?),
                None => out.push(item.to_json()),
            }
        }
        Ok(serde_json::Value::Array(out))
    }
}

impl fmt::Debug for Through {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Through")
            .field("through", &self.through)
            .field("using", &self.using)
            .field("model", &self.schema.name())
            .finish()
    }
}
