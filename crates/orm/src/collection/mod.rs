//! Ordered, index-addressable collection of values
//!
//! Collections share the graph contract of documents: children keep a
//! parent edge to every collection holding them, changes bubble up to
//! watchers, and modification is tracked against a persisted baseline.
//! Removing an entry re-indexes the entries after it.

mod cursor;

pub use cursor::Cursor;

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::document::{export_node, wrap_raw, Document, ExportOptions, ModifiedOptions};
use crate::error::{OrmError, OrmResult};
use crate::graph::{self, next_id, Node, NodeCore, NodeId, Parents, MEMBER};
use crate::path;
use crate::query::EmbedSpec;
use crate::schema::{CastOptions, SaveOptions, Schema};
use crate::value::Value;

pub(crate) struct CollectionState {
    pub core: NodeCore,
    pub items: Vec<Value>,
    pub persisted: Vec<Value>,
    pub schema: Option<Arc<Schema>>,
    pub base_path: String,
    pub meta: serde_json::Map<String, serde_json::Value>,
}

struct Shared {
    id: NodeId,
    state: Mutex<CollectionState>,
}

/// An ordered sequence of documents or scalars
#[derive(Clone)]
pub struct Collection {
    inner: Arc<Shared>,
}

/// Weak handle on a collection
#[derive(Clone)]
pub struct WeakCollection {
    inner: Weak<Shared>,
}

impl WeakCollection {
    pub fn upgrade(&self) -> Option<Collection> {
        self.inner.upgrade().map(|inner| Collection { inner })
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    pub fn new() -> Self {
        Self::bound(None, String::new())
    }

    /// A schemaless collection. Raw maps and lists are wrapped, and the
    /// initial items are the persisted baseline.
    pub fn with_items(items: Vec<Value>) -> OrmResult<Self> {
        let collection = Self::new();
        for item in items {
            collection.insert_item(wrap_raw(item)?);
        }
        collection.snapshot();
        Ok(collection)
    }

    /// A collection whose entries are cast by `schema` at `options.base_path`
    pub fn with_schema(schema: &Arc<Schema>, items: Vec<Value>, options: CastOptions) -> OrmResult<Self> {
        let collection = Self::bound(Some(schema.clone()), options.base_path.clone());
        for item in items {
            let item = schema.cast(
                None,
                item,
                CastOptions {
                    element: true,
                    parent: None,
                    ..options.clone()
                },
            )?;
            collection.insert_item(item);
        }
        collection.snapshot();
        Ok(collection)
    }

    pub(crate) fn bound(schema: Option<Arc<Schema>>, base_path: String) -> Self {
        Self {
            inner: Arc::new(Shared {
                id: next_id(),
                state: Mutex::new(CollectionState {
                    core: NodeCore::default(),
                    items: Vec::new(),
                    persisted: Vec::new(),
                    schema,
                    base_path,
                    meta: serde_json::Map::new(),
                }),
            }),
        }
    }

    /// A collection of already cast entries, persisted as is
    pub(crate) fn loaded(schema: Option<Arc<Schema>>, base_path: String, items: Vec<Value>) -> Self {
        let collection = Self::bound(schema, base_path);
        for item in items {
            collection.insert_item(item);
        }
        collection.snapshot();
        collection
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CollectionState> {
        self.inner.state.lock()
    }

    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut NodeCore) -> R) -> R {
        f(&mut self.lock().core)
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.id
    }

    pub fn node(&self) -> Node {
        Node::Collection(self.clone())
    }

    pub fn downgrade(&self) -> WeakCollection {
        WeakCollection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.lock().schema.clone()
    }

    pub fn base_path(&self) -> String {
        self.lock().base_path.clone()
    }

    fn cast_item(&self, raw: Value) -> OrmResult<Value> {
        let (schema, base_path) = {
            let state = self.lock();
            (state.schema.clone(), state.base_path.clone())
        };
        match schema {
            Some(schema) => schema.cast(
                None,
                raw,
                CastOptions {
                    base_path,
                    element: true,
                    ..Default::default()
                },
            ),
            None => wrap_raw(raw),
        }
    }

    pub(crate) fn insert_item(&self, item: Value) {
        self.lock().items.push(item.clone());
        graph::attach(&self.node(), MEMBER, &item);
    }

    pub(crate) fn snapshot(&self) {
        let mut state = self.lock();
        state.persisted = state.items.clone();
    }

    /// Append an entry, returns its index
    pub fn push(&self, item: impl Into<Value>) -> OrmResult<usize> {
        let item = self.cast_item(item.into())?;
        let index = {
            let mut state = self.lock();
            state.items.push(item.clone());
            state.items.len() - 1
        };
        let node = self.node();
        graph::attach(&node, MEMBER, &item);
        graph::notify(&node, &index.to_string());
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.lock().items.get(index).cloned()
    }

    /// Replace the entry at `index`, or append when `index` is the length
    pub fn set(&self, index: usize, item: impl Into<Value>) -> OrmResult<()> {
        let item = self.cast_item(item.into())?;
        let previous = {
            let mut state = self.lock();
            let len = state.items.len();
            if index > len {
                return Err(OrmError::IndexOutOfBounds { index, len });
            }
            if index == len {
                state.items.push(item.clone());
                None
            } else {
                Some(std::mem::replace(&mut state.items[index], item.clone()))
            }
        };
        let node = self.node();
        if let Some(previous) = previous {
            if !previous.same(&item) {
                graph::detach(&node, &previous);
            }
        }
        graph::attach(&node, MEMBER, &item);
        graph::notify(&node, &index.to_string());
        Ok(())
    }

    /// Remove the entry at `index`, later entries shift down by one
    pub fn unset(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut state = self.lock();
            (index < state.items.len()).then(|| state.items.remove(index))
        };
        if let Some(removed) = &removed {
            let node = self.node();
            graph::detach(&node, removed);
            graph::notify(&node, &index.to_string());
        }
        removed
    }

    pub fn has(&self, index: usize) -> bool {
        index < self.len()
    }

    /// Current indexes
    pub fn keys(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn count(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries
    pub fn items(&self) -> Vec<Value> {
        self.lock().items.clone()
    }

    /// Entries that are documents
    pub fn documents(&self) -> Vec<Document> {
        self.lock()
            .items
            .iter()
            .filter_map(|item| item.as_document().cloned())
            .collect()
    }

    fn parse_index(path: &str, segment: &str) -> OrmResult<usize> {
        path::index(segment).ok_or_else(|| OrmError::InvalidPathSegment {
            path: path.to_string(),
            segment: segment.to_string(),
        })
    }

    /// Read a value at a dotted path whose first segment is an index
    pub fn get_path(&self, path: &str) -> OrmResult<Value> {
        let (head, rest) = path::head(path)?;
        let index = Self::parse_index(path, head)?;
        let value = self.get(index).unwrap_or_default();
        match rest {
            None => Ok(value),
            Some(rest) => match value {
                Value::Document(doc) => doc.get(rest),
                Value::Collection(col) => col.get_path(rest),
                Value::Through(through) => through.get_path(rest),
                Value::Null => Ok(Value::Null),
                raw @ (Value::Object(_) | Value::Array(_)) => Ok(path::get(&raw, rest)?.cloned().unwrap_or_default()),
                _ => Err(OrmError::InvalidPathSegment {
                    path: path.to_string(),
                    segment: rest.split('.').next().unwrap_or(rest).to_string(),
                }),
            },
        }
    }

    /// Write a value at a dotted path whose first segment is an index
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        let index = Self::parse_index(path, head)?;
        let Some(rest) = rest else {
            return self.set(index, value);
        };
        let child = match self.get(index) {
            Some(child) if !child.is_null() => child,
            _ => {
                let next = rest.split('.').next().unwrap_or(rest);
                let empty = if path::index(next).is_some() {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(Default::default())
                };
                self.set(index, empty)?;
                self.get(index).unwrap_or_default()
            }
        };
        match child {
            Value::Document(doc) => doc.set(rest, value),
            Value::Collection(col) => col.set_path(rest, value),
            Value::Through(through) => through.set_path(rest, value),
            mut tree @ (Value::Object(_) | Value::Array(_)) => {
                path::set(&mut tree, rest, value.into())?;
                self.set(index, tree)
            }
            _ => Err(OrmError::InvalidPathSegment {
                path: path.to_string(),
                segment: head.to_string(),
            }),
        }
    }

    pub fn unset_path(&self, path: &str) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        let index = Self::parse_index(path, head)?;
        match rest {
            None => {
                self.unset(index);
                Ok(())
            }
            Some(rest) => match self.get(index) {
                Some(Value::Document(doc)) => doc.unset(rest),
                Some(Value::Collection(col)) => col.unset_path(rest),
                Some(Value::Through(through)) => through.unset_path(rest),
                Some(mut tree @ (Value::Object(_) | Value::Array(_))) => {
                    if path::unset(&mut tree, rest)?.is_some() {
                        self.set(index, tree)?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }

    pub fn has_path(&self, path: &str) -> OrmResult<bool> {
        let (head, rest) = path::head(path)?;
        let Some(index) = path::index(head) else {
            return Ok(false);
        };
        match (self.get(index), rest) {
            (None, _) => Ok(false),
            (Some(_), None) => Ok(true),
            (Some(Value::Document(doc)), Some(rest)) => doc.has(rest),
            (Some(Value::Collection(col)), Some(rest)) => col.has_path(rest),
            (Some(Value::Through(through)), Some(rest)) => through.has_path(rest),
            (Some(tree @ (Value::Object(_) | Value::Array(_))), Some(rest)) => Ok(path::has(&tree, rest)),
            (Some(_), Some(_)) => Ok(false),
        }
    }

    /// Group entries by the value of `field`. With `by_index` the buckets
    /// hold entry indexes instead of entries.
    pub fn index_by(&self, field: &str, by_index: bool) -> OrmResult<IndexMap<String, Vec<Value>>> {
        index_values(&self.items(), field, by_index)
    }

    /// First index of `item` at or after `from`, by identity
    pub fn index_of(&self, item: &Value, from: usize) -> Option<usize> {
        let items = self.items();
        items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, candidate)| candidate.same(item))
            .map(|(index, _)| index)
    }

    /// Last index of `item` at or after `from`, by identity
    pub fn last_index_of(&self, item: &Value, from: usize) -> Option<usize> {
        let items = self.items();
        items
            .iter()
            .enumerate()
            .skip(from)
            .filter(|(_, candidate)| candidate.same(item))
            .map(|(index, _)| index)
            .last()
    }

    /// Index of the entity whose primary key matches `id`
    pub fn index_of_id(&self, id: impl Into<Value>) -> OrmResult<Option<usize>> {
        let wanted = id.into().key_string();
        for (index, item) in self.items().iter().enumerate() {
            let doc = item.as_document().ok_or(OrmError::NotAModelCollection)?;
            let schema = doc.schema().ok_or(OrmError::NotAModelCollection)?;
            let key = doc.get(schema.key())?.key_string();
            if key.is_some() && key == wanted {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn derive(&self, items: Vec<Value>) -> Collection {
        let (schema, base_path) = {
            let state = self.lock();
            (state.schema.clone(), state.base_path.clone())
        };
        let collection = Collection::bound(schema, base_path);
        for item in items {
            collection.insert_item(item);
        }
        collection.snapshot();
        collection
    }

    /// New collection with the entries matching `predicate`
    pub fn filter<F>(&self, predicate: F) -> Collection
    where
        F: Fn(&Value) -> bool,
    {
        self.derive(self.items().into_iter().filter(|item| predicate(item)).collect())
    }

    /// New schemaless collection of mapped entries
    pub fn map<F>(&self, f: F) -> Collection
    where
        F: Fn(&Value) -> Value,
    {
        let mapped: Vec<Value> = self.items().iter().map(f).collect();
        let collection = Collection::new();
        for item in mapped {
            collection.insert_item(item);
        }
        collection.snapshot();
        collection
    }

    pub fn reduce<T, F>(&self, f: F, initial: T) -> T
    where
        F: Fn(T, &Value) -> T,
    {
        self.items().iter().fold(initial, f)
    }

    /// New collection with the entries in `start..end`
    pub fn slice(&self, start: usize, end: Option<usize>) -> Collection {
        let items = self.items();
        let end = end.unwrap_or(items.len()).min(items.len());
        let start = start.min(end);
        self.derive(items[start..end].to_vec())
    }

    /// Remove `delete` entries from `start` and insert `insert` in their place
    pub fn splice(&self, start: usize, delete: usize, insert: Vec<Value>) -> OrmResult<Vec<Value>> {
        let insert = insert
            .into_iter()
            .map(|item| self.cast_item(item))
            .collect::<OrmResult<Vec<_>>>()?;
        let removed: Vec<Value> = {
            let mut state = self.lock();
            let len = state.items.len();
            if start > len {
                return Err(OrmError::IndexOutOfBounds { index: start, len });
            }
            let end = (start + delete).min(len);
            state.items.splice(start..end, insert.clone()).collect()
        };
        let node = self.node();
        for item in &removed {
            graph::detach(&node, item);
        }
        for item in &insert {
            graph::attach(&node, MEMBER, item);
        }
        graph::notify(&node, "");
        Ok(removed)
    }

    /// Sort in place
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.lock().items.sort_by(compare);
        graph::notify(&self.node(), "");
    }

    /// Append raw or cast entries
    pub fn merge(&self, items: Vec<Value>) -> OrmResult<()> {
        for item in items {
            self.push(item)?;
        }
        Ok(())
    }

    /// Append the entries of another collection
    pub fn append(&self, other: &Collection) -> OrmResult<()> {
        self.merge(other.items())
    }

    /// Replace every entry by `f(entry)` in place
    pub fn apply<F>(&self, f: F) -> OrmResult<&Self>
    where
        F: Fn(&Value) -> Value,
    {
        for (index, item) in self.items().iter().enumerate() {
            self.set(index, f(item))?;
        }
        Ok(self)
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut self.lock().items);
        let node = self.node();
        for item in &removed {
            graph::detach(&node, item);
        }
        graph::notify(&node, "");
    }

    pub fn meta(&self) -> serde_json::Map<String, serde_json::Value> {
        self.lock().meta.clone()
    }

    pub fn set_meta(&self, meta: serde_json::Map<String, serde_json::Value>) {
        self.lock().meta = meta;
    }

    /// Eager load relations on every entity of the collection
    pub async fn embed(&self, relations: &[EmbedSpec]) -> OrmResult<()> {
        let schema = self.schema().ok_or(OrmError::Unbound)?;
        schema.embed(&self.documents(), relations).await
    }

    /// Save every entity of the collection
    pub async fn broadcast(&self, options: &SaveOptions) -> OrmResult<bool> {
        let schema = self.schema().ok_or(OrmError::Unbound)?;
        schema.broadcast(self, options).await
    }

    /// Cursor over a snapshot of the entries
    pub fn cursor(&self) -> Cursor<Value> {
        Cursor::from_items(self.items())
    }

    pub fn parents(&self) -> Parents {
        self.node().parents()
    }

    pub fn disconnect(&self) {
        self.node().disconnect();
    }

    pub fn watch<F>(&self, path: &str, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock().core.watchers.insert(path.to_string(), Arc::new(callback));
    }

    pub fn unwatch(&self, path: &str) {
        self.lock().core.watchers.shift_remove(path);
    }

    pub fn modified(&self) -> bool {
        self.modified_inner(&ModifiedOptions::default(), &mut HashSet::new())
    }

    pub(crate) fn modified_inner(&self, options: &ModifiedOptions, visited: &mut HashSet<NodeId>) -> bool {
        if !visited.insert(self.node_id()) {
            return false;
        }
        let (items, persisted) = {
            let state = self.lock();
            (state.items.clone(), state.persisted.clone())
        };
        if items.len() != persisted.len() || items.iter().zip(&persisted).any(|(a, b)| !a.same(b)) {
            return true;
        }
        items.iter().any(|item| match item {
            Value::Document(doc) => !doc.modified_inner(options, visited).is_empty(),
            Value::Collection(col) => col.modified_inner(options, visited),
            _ => false,
        })
    }

    /// Make the current entries the persisted baseline of the subtree
    pub fn amend(&self) {
        self.amend_inner(true, &mut HashSet::new());
    }

    pub(crate) fn amend_inner(&self, deep: bool, visited: &mut HashSet<NodeId>) {
        if !visited.insert(self.node_id()) {
            return;
        }
        let items = {
            let mut state = self.lock();
            state.persisted = state.items.clone();
            state.items.clone()
        };
        for item in items {
            match item {
                Value::Document(doc) => doc.amend_inner(deep, visited),
                Value::Collection(col) => col.amend_inner(deep, visited),
                _ => {}
            }
        }
    }

    /// Go back to the persisted entries
    pub fn restore(&self) {
        self.restore_inner(&mut HashSet::new());
    }

    pub(crate) fn restore_inner(&self, visited: &mut HashSet<NodeId>) {
        if !visited.insert(self.node_id()) {
            return;
        }
        let (previous, restored) = {
            let mut state = self.lock();
            let restored = state.persisted.clone();
            let previous = std::mem::replace(&mut state.items, restored.clone());
            (previous, restored)
        };
        let node = self.node();
        for item in &previous {
            graph::detach(&node, item);
        }
        for item in &restored {
            graph::attach(&node, MEMBER, item);
        }
        for item in &restored {
            match item {
                Value::Document(doc) => doc.restore_inner(visited),
                Value::Collection(col) => col.restore_inner(visited),
                _ => {}
            }
        }
        graph::notify(&node, "");
    }

    pub(crate) fn position_of(&self, child: NodeId) -> Option<usize> {
        let items = self.items();
        items
            .iter()
            .position(|item| item.node().map(|node| node.id()) == Some(child))
    }

    /// Drop every entry that is `child`
    pub(crate) fn remove_child(&self, child: NodeId) {
        while let Some(index) = self.position_of(child) {
            self.unset(index);
        }
    }

    pub fn to(&self, format: &str, options: &ExportOptions) -> OrmResult<serde_json::Value> {
        self.to_inner(format, options, &mut Vec::new())
    }

    pub fn data(&self, options: &ExportOptions) -> OrmResult<serde_json::Value> {
        self.to("array", options)
    }

    pub(crate) fn to_inner(
        &self,
        format: &str,
        options: &ExportOptions,
        ancestors: &mut Vec<NodeId>,
    ) -> OrmResult<serde_json::Value> {
        let (items, schema, base_path) = {
            let state = self.lock();
            (state.items.clone(), state.schema.clone(), state.base_path.clone())
        };
        ancestors.push(self.node_id());
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            let exported = match item {
                Value::Document(_) | Value::Collection(_) => {
                    let Some(node) = item.node() else { continue };
                    if ancestors.contains(&node.id()) {
                        continue;
                    }
                    export_node(&node, format, options, ancestors)?
                }
                Value::Through(through) => through.to_inner(format, options, ancestors)?,
                scalar => match &schema {
                    Some(schema) if !base_path.is_empty() => schema.format(format, &base_path, scalar)?.to_json(),
                    _ => scalar.to_json(),
                },
            };
            out.push(exported);
        }
        ancestors.pop();
        Ok(serde_json::Value::Array(out))
    }
}

/// Shared by collections and through views
pub(crate) fn index_values(items: &[Value], field: &str, by_index: bool) -> OrmResult<IndexMap<String, Vec<Value>>> {
    let mut buckets: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (index, item) in items.iter().enumerate() {
        let key = match item {
            Value::Document(doc) => doc.get(field)?,
            _ => Value::Null,
        };
        let Some(key) = key.key_string() else {
            continue;
        };
        let entry = if by_index { Value::from(index) } else { item.clone() };
        buckets.entry(key).or_default().push(entry);
    }
    Ok(buckets)
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (base_path, len) = match self.inner.state.try_lock() {
            Some(state) => (state.base_path.clone(), state.items.len()),
            None => (String::new(), 0),
        };
        f.debug_struct("Collection")
            .field("node", &self.inner.id)
            .field("base_path", &base_path)
            .field("len", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn people() -> Collection {
        Collection::with_items(vec![
            Value::from(json!({"name": "ada", "team": "core"})),
            Value::from(json!({"name": "bob", "team": "web"})),
            Value::from(json!({"name": "cy", "team": "core"})),
        ])
        .unwrap()
    }

    #[test]
    fn test_with_items_rejects_empty_field_names() {
        let err = Collection::with_items(vec![Value::from(json!({"": 1}))]).unwrap_err();
        assert_eq!(err, OrmError::EmptyFieldName);

        let err = Collection::with_items(vec![1.into(), Value::from(json!([{"ok": 1, "": 2}]))]).unwrap_err();
        assert_eq!(err, OrmError::EmptyFieldName);
    }

    #[test]
    fn test_unset_reindexes() {
        let collection = Collection::with_items(vec![1.into(), 2.into(), 3.into(), 4.into()]).unwrap();
        collection.unset(1);
        assert_eq!(collection.keys(), vec![0, 1, 2]);
        assert_eq!(collection.items(), vec![Value::from(1), Value::from(3), Value::from(4)]);
        assert!(collection.modified());
    }

    #[test]
    fn test_index_by() {
        let collection = people();
        let buckets = collection.index_by("team", false).unwrap();
        assert_eq!(buckets["core"].len(), 2);
        assert_eq!(buckets["web"].len(), 1);

        let positions = collection.index_by("team", true).unwrap();
        assert_eq!(positions["core"], vec![Value::from(0), Value::from(2)]);
    }

    #[test]
    fn test_index_of_is_identity_based() {
        let collection = people();
        let second = collection.get(1).unwrap();
        assert_eq!(collection.index_of(&second, 0), Some(1));
        assert_eq!(collection.index_of(&second, 2), None);

        let lookalike = Value::from(Document::with_data(json!({"name": "bob", "team": "web"})).unwrap());
        assert_eq!(collection.index_of(&lookalike, 0), None);

        collection.push(second.clone()).unwrap();
        assert_eq!(collection.last_index_of(&second, 0), Some(3));
    }

    #[test]
    fn test_index_of_id_needs_models() {
        let collection = people();
        assert_eq!(collection.index_of_id(1).unwrap_err(), OrmError::NotAModelCollection);
    }

    #[test]
    fn test_derived_collections_are_independent() {
        let collection = people();
        let core = collection.filter(|item| {
            item.as_document()
                .and_then(|doc| doc.get("team").ok())
                .map(|team| team == Value::from("core"))
                .unwrap_or(false)
        });
        assert_eq!(core.len(), 2);

        core.unset(0);
        assert_eq!(collection.len(), 3);

        let names = collection.map(|item| item.as_document().map(|d| d.get("name").unwrap()).unwrap_or_default());
        assert_eq!(names.data(&ExportOptions::default()).unwrap(), json!(["ada", "bob", "cy"]));
        assert_eq!(collection.slice(1, None).len(), 2);
        assert_eq!(collection.reduce(|acc, _| acc + 1, 0), 3);
    }

    #[test]
    fn test_splice_and_sort() {
        let collection = Collection::with_items(vec![3.into(), 1.into(), 2.into()]).unwrap();
        let removed = collection.splice(1, 1, vec![5.into(), 4.into()]).unwrap();
        assert_eq!(removed, vec![Value::from(1)]);
        collection.sort_by(|a, b| a.as_i64().cmp(&b.as_i64()));
        assert_eq!(collection.data(&ExportOptions::default()).unwrap(), json!([2, 3, 4, 5]));
    }

    #[test]
    fn test_apply_in_place() {
        let collection = Collection::with_items(vec![1.into(), 2.into()]).unwrap();
        collection
            .apply(|item| Value::from(item.as_i64().unwrap_or_default() * 10))
            .unwrap();
        assert_eq!(collection.items(), vec![Value::from(10), Value::from(20)]);
    }

    #[test]
    fn test_member_edges() {
        let collection = Collection::new();
        let doc = Document::new();
        collection.push(doc.clone()).unwrap();
        assert_eq!(doc.parents().get(&collection).as_deref(), Some(MEMBER));

        doc.disconnect();
        assert!(collection.is_empty());
    }

    #[test]
    fn test_path_access() {
        let collection = people();
        assert_eq!(collection.get_path("1.name").unwrap(), Value::from("bob"));
        collection.set_path("0.name", "ava").unwrap();
        assert_eq!(collection.get_path("0.name").unwrap(), Value::from("ava"));
        assert!(collection.has_path("2.team").unwrap());
        assert!(matches!(
            collection.get_path("first.name").unwrap_err(),
            OrmError::InvalidPathSegment { .. }
        ));
    }

    #[test]
    fn test_paths_reach_into_json_entries() {
        let mut schema = Schema::new("Sensor");
        schema
            .column("readings", crate::schema::Column::new("json").array())
            .unwrap();
        let schema = schema.build();
        let doc = Document::with_schema(
            &schema,
            json!({"readings": [{"t": 1, "tags": ["a"]}, {"t": 2}]}),
            CastOptions::default(),
        )
        .unwrap();
        let readings = doc.get("readings").unwrap();
        let readings = readings.as_collection().unwrap();

        assert_eq!(readings.get_path("1.t").unwrap(), Value::Integer(2));
        assert!(readings.has_path("0.tags.0").unwrap());
        assert!(!readings.has_path("1.tags").unwrap());

        readings.set_path("1.t", 5).unwrap();
        assert_eq!(doc.get("readings.1.t").unwrap(), Value::Integer(5));

        readings.unset_path("0.tags").unwrap();
        assert!(!readings.has_path("0.tags").unwrap());
        assert_eq!(readings.get_path("0.t").unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_meta_and_cursor() {
        let collection = Collection::with_items(vec![1.into(), 2.into()]).unwrap();
        let mut meta = serde_json::Map::new();
        meta.insert("total".into(), json!(10));
        collection.set_meta(meta);
        assert_eq!(collection.meta()["total"], json!(10));

        let mut cursor = collection.cursor();
        assert_eq!(cursor.current(), Some(&Value::from(1)));
        assert_eq!(cursor.count(), 2);
    }
}
