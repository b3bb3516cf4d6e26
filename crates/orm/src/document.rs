//! Path-addressable, change-tracked document
//!
//! A `Document` is a cheap handle on a shared node. Cloning the handle
//! aliases the node, so a mutation through one parent is visible through
//! every other holder. Raw values entering a document are cast by its
//! schema when one is bound, otherwise maps and lists are wrapped into
//! plain nested documents and collections.
//!
//! No lock is held while calling into another node or into user code
//! (getters, setters, watchers).

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::collection::Collection;
use crate::error::{OrmError, OrmResult};
use crate::graph::{self, next_id, Node, NodeCore, NodeId, Parents};
use crate::path;
use crate::schema::{CastOptions, Schema};
use crate::value::{Map, Value};

/// Options for change detection
#[derive(Debug, Clone)]
pub struct ModifiedOptions {
    /// Only check this top-level field
    pub field: Option<String>,
    /// Fields excluded from the check
    pub ignore: Vec<String>,
    /// Whether external relations take part in the check
    pub embed: bool,
}

impl Default for ModifiedOptions {
    fn default() -> Self {
        Self {
            field: None,
            ignore: Vec::new(),
            embed: true,
        }
    }
}

impl ModifiedOptions {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn ignore<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore: fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Options for exporting a subtree to plain data
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Whether external relations are exported
    pub embed: bool,
    /// Restrict top-level fields to this list when not empty
    pub fields: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            embed: true,
            fields: Vec::new(),
        }
    }
}

pub(crate) struct DocumentState {
    pub core: NodeCore,
    pub data: Map,
    pub persisted: Map,
    pub schema: Option<Arc<Schema>>,
    pub base_path: String,
    pub exists: bool,
    pub errors: IndexMap<String, Vec<String>>,
}

struct Shared {
    id: NodeId,
    state: Mutex<DocumentState>,
}

/// A mutable, change-tracked node of the data graph
#[derive(Clone)]
pub struct Document {
    inner: Arc<Shared>,
}

/// Weak handle on a document
#[derive(Clone)]
pub struct WeakDocument {
    inner: Weak<Shared>,
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.inner.upgrade().map(|inner| Document { inner })
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document without schema
    pub fn new() -> Self {
        Self::bound(None, String::new(), false)
    }

    /// A document without schema wrapping raw data. Nested maps and lists
    /// become documents and collections. The initial data is the persisted
    /// baseline.
    pub fn with_data(data: impl Into<Value>) -> OrmResult<Self> {
        match wrap_raw(data.into())? {
            Value::Document(doc) => Ok(doc),
            other => Err(OrmError::InvalidCast(format!(
                "a document needs an object, got {}",
                other.type_name()
            ))),
        }
    }

    /// A document cast by `schema`
    pub fn with_schema(schema: &Arc<Schema>, data: impl Into<Value>, options: CastOptions) -> OrmResult<Self> {
        match schema.cast(None, data.into(), options)? {
            Value::Document(doc) => Ok(doc),
            other => Err(OrmError::InvalidCast(format!(
                "`{}` cast produced a {}",
                schema.name(),
                other.type_name()
            ))),
        }
    }

    pub(crate) fn bound(schema: Option<Arc<Schema>>, base_path: String, exists: bool) -> Self {
        Self {
            inner: Arc::new(Shared {
                id: next_id(),
                state: Mutex::new(DocumentState {
                    core: NodeCore::default(),
                    data: Map::new(),
                    persisted: Map::new(),
                    schema,
                    base_path,
                    exists,
                    errors: IndexMap::new(),
                }),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.inner.state.lock()
    }

    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut NodeCore) -> R) -> R {
        f(&mut self.lock().core)
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.id
    }

    pub fn node(&self) -> Node {
        Node::Document(self.clone())
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same node
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.lock().schema.clone()
    }

    /// Schema path this document stands for when nested
    pub fn base_path(&self) -> String {
        self.lock().base_path.clone()
    }

    /// Primary key rendered as a string, for diagnostics
    pub fn id_hint(&self) -> Option<String> {
        let state = self.lock();
        let key = state.schema.as_ref().map(|s| s.key().to_string())?;
        state.data.get(&key).and_then(Value::key_string)
    }

    /// Read a value at a dotted path
    pub fn get(&self, path: &str) -> OrmResult<Value> {
        let (head, rest) = path::head(path)?;
        let value = self.get_field(head)?;
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

    /// The full field mapping
    pub fn fields(&self) -> Map {
        self.lock().data.clone()
    }

    /// Raw stored value of a top-level field, no default, getter or relation
    pub(crate) fn stored(&self, name: &str) -> Option<Value> {
        self.lock().data.get(name).cloned()
    }

    fn get_field(&self, name: &str) -> OrmResult<Value> {
        let (stored, schema, base_path) = {
            let state = self.lock();
            (state.data.get(name).cloned(), state.schema.clone(), state.base_path.clone())
        };
        let Some(schema) = schema else {
            return Ok(stored.unwrap_or_default());
        };

        let field_path = path::join(&base_path, name);
        let column = schema.column_spec(&field_path);
        let value = match stored {
            Some(value) => value,
            None if schema.has_relation(&field_path, None) => {
                return schema.relation(&field_path)?.get(self);
            }
            None => match &column {
                Some(column) => match &column.default {
                    Some(default) => self.cast_field(name, default.clone())?,
                    None => Value::Null,
                },
                None if schema.locked() && !schema.has_nested(&field_path) => {
                    return Err(OrmError::MissingSchemaField {
                        model: schema.name().to_string(),
                        field: field_path,
                    })
                }
                None => Value::Null,
            },
        };

        Ok(match column.and_then(|column| column.getter) {
            Some(getter) => getter(self, value),
            None => value,
        })
    }

    /// Write a value at a dotted path, creating missing intermediate documents
    pub fn set(&self, path: &str, value: impl Into<Value>) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        match rest {
            None => self.set_field(head, value.into()),
            Some(rest) => match self.child_for_write(head, rest)? {
                Value::Document(doc) => doc.set(rest, value),
                Value::Collection(col) => col.set_path(rest, value),
                Value::Through(through) => through.set_path(rest, value),
                mut tree @ (Value::Object(_) | Value::Array(_)) => {
                    path::set(&mut tree, rest, value.into())?;
                    self.put(head, tree, true);
                    Ok(())
                }
                _ => Err(OrmError::InvalidPathSegment {
                    path: path.to_string(),
                    segment: head.to_string(),
                }),
            },
        }
    }

    /// Set every field of a raw object
    pub fn set_many(&self, bag: impl Into<Value>) -> OrmResult<()> {
        match bag.into() {
            Value::Object(map) => {
                for (field, value) in map {
                    self.set(&field, value)?;
                }
                Ok(())
            }
            Value::Document(doc) => {
                for (field, value) in doc.fields() {
                    self.set(&field, value)?;
                }
                Ok(())
            }
            other => Err(OrmError::InvalidCast(format!(
                "can't set fields from a {}",
                other.type_name()
            ))),
        }
    }

    fn set_field(&self, name: &str, raw: Value) -> OrmResult<()> {
        let value = self.cast_field(name, raw)?;
        self.put(name, value, true);
        Ok(())
    }

    fn child_for_write(&self, name: &str, rest: &str) -> OrmResult<Value> {
        let current = self.lock().data.get(name).cloned();
        match current {
            Some(value) if !value.is_null() => Ok(value),
            _ => {
                let next = rest.split('.').next().unwrap_or(rest);
                let empty = if path::index(next).is_some() {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(Map::new())
                };
                let created = self.cast_field(name, empty)?;
                self.put(name, created.clone(), true);
                Ok(created)
            }
        }
    }

    pub(crate) fn cast_field(&self, name: &str, raw: Value) -> OrmResult<Value> {
        let (schema, base_path) = {
            let state = self.lock();
            (state.schema.clone(), state.base_path.clone())
        };
        match schema {
            Some(schema) => schema.cast(
                Some(name),
                raw,
                CastOptions {
                    base_path,
                    parent: Some(self.clone()),
                    ..Default::default()
                },
            ),
            None => wrap_raw(raw),
        }
    }

    /// Store an already cast value, maintaining parent edges
    fn put(&self, name: &str, value: Value, notify: bool) {
        let previous = self.lock().data.insert(name.to_string(), value.clone());
        let node = self.node();
        if let Some(previous) = previous {
            if !previous.same(&value) {
                graph::detach(&node, &previous);
            }
        }
        graph::attach(&node, name, &value);
        if notify {
            graph::notify(&node, name);
        }
    }

    /// Store a cast value during construction, without notification
    pub(crate) fn insert_field(&self, name: &str, value: Value) {
        self.put(name, value, false);
    }

    /// Store data loaded from the datasource. It becomes part of the
    /// persisted baseline so loading never reads as a change.
    pub(crate) fn attach_loaded(&self, name: &str, value: Value) {
        {
            let mut state = self.lock();
            state.persisted.insert(name.to_string(), value.clone());
        }
        self.put(name, value, false);
    }

    /// Make the current data the persisted baseline of this node only
    pub(crate) fn snapshot(&self) {
        let mut state = self.lock();
        state.persisted = state.data.clone();
    }

    /// Remove a value at a dotted path
    pub fn unset(&self, path: &str) -> OrmResult<()> {
        let (head, rest) = path::head(path)?;
        match rest {
            None => {
                self.unset_field(head);
                Ok(())
            }
            Some(rest) => {
                let child = self.lock().data.get(head).cloned();
                match child {
                    Some(Value::Document(doc)) => doc.unset(rest),
                    Some(Value::Collection(col)) => col.unset_path(rest),
                    Some(Value::Through(through)) => through.unset_path(rest),
                    Some(mut tree @ (Value::Object(_) | Value::Array(_))) => {
                        if path::unset(&mut tree, rest)?.is_some() {
                            self.put(head, tree, true);
                        }
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    fn unset_field(&self, name: &str) {
        let removed = self.lock().data.shift_remove(name);
        if let Some(removed) = removed {
            let node = self.node();
            graph::detach(&node, &removed);
            graph::notify(&node, name);
        }
    }

    /// Whether a value exists at a dotted path
    pub fn has(&self, path: &str) -> OrmResult<bool> {
        let (head, rest) = path::head(path)?;
        let value = self.lock().data.get(head).cloned();
        match (value, rest) {
            (None, _) => Ok(false),
            (Some(_), None) => Ok(true),
            (Some(Value::Document(doc)), Some(rest)) => doc.has(rest),
            (Some(Value::Collection(col)), Some(rest)) => col.has_path(rest),
            (Some(Value::Through(through)), Some(rest)) => through.has_path(rest),
            (Some(tree @ (Value::Object(_) | Value::Array(_))), Some(rest)) => Ok(path::has(&tree, rest)),
            (Some(_), Some(_)) => Ok(false),
        }
    }

    #[deprecated(note = "use `has` instead")]
    pub fn isset(&self, path: &str) -> OrmResult<bool> {
        self.has(path)
    }

    /// Watch changes at or below `path`, the empty path watches everything.
    /// Watching the same path again replaces the callback.
    pub fn watch<F>(&self, path: &str, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock().core.watchers.insert(path.to_string(), Arc::new(callback));
    }

    pub fn unwatch(&self, path: &str) {
        self.lock().core.watchers.shift_remove(path);
    }

    /// Whether any field differs from the persisted baseline
    pub fn modified(&self) -> bool {
        self.modified_with(&ModifiedOptions::default())
    }

    /// Whether a single field differs from the persisted baseline
    pub fn modified_field(&self, name: &str) -> bool {
        self.modified_with(&ModifiedOptions::field(name))
    }

    pub fn modified_with(&self, options: &ModifiedOptions) -> bool {
        !self.modified_fields(options).is_empty()
    }

    /// Names of the modified top-level fields
    pub fn modified_fields(&self, options: &ModifiedOptions) -> Vec<String> {
        self.modified_inner(options, &mut HashSet::new())
    }

    pub(crate) fn modified_inner(&self, options: &ModifiedOptions, visited: &mut HashSet<NodeId>) -> Vec<String> {
        if !visited.insert(self.node_id()) {
            return Vec::new();
        }
        let (data, persisted, schema, base_path) = {
            let state = self.lock();
            (
                state.data.clone(),
                state.persisted.clone(),
                state.schema.clone(),
                state.base_path.clone(),
            )
        };

        let fields: Vec<String> = match &options.field {
            Some(field) => vec![field.clone()],
            None => data
                .keys()
                .chain(persisted.keys().filter(|key| !data.contains_key(*key)))
                .cloned()
                .collect(),
        };
        let nested = ModifiedOptions {
            field: None,
            ignore: Vec::new(),
            embed: options.embed,
        };

        let mut modified = Vec::new();
        for field in fields {
            if options.ignore.contains(&field) {
                continue;
            }
            if !options.embed {
                if let Some(schema) = &schema {
                    if schema.has_relation(&path::join(&base_path, &field), Some(false)) {
                        continue;
                    }
                }
            }
            let changed = match (data.get(&field), persisted.get(&field)) {
                (None, None) => false,
                (Some(_), None) | (None, Some(_)) => true,
                (Some(current), Some(original)) => {
                    !current.same(original) || value_modified(current, &nested, visited)
                }
            };
            if changed {
                modified.push(field);
            }
        }
        modified
    }

    /// Value of a field in the persisted baseline
    pub fn persisted(&self, field: &str) -> Option<Value> {
        self.lock().persisted.get(field).cloned()
    }

    /// Alias of [`Document::persisted`]
    pub fn original(&self, field: &str) -> Option<Value> {
        self.persisted(field)
    }

    /// The whole persisted baseline
    pub fn persisted_data(&self) -> Map {
        self.lock().persisted.clone()
    }

    /// Merge `data` when given, then make the current state the persisted
    /// baseline of the whole subtree
    pub fn amend(&self, data: Option<Value>) -> OrmResult<()> {
        if let Some(data) = data {
            self.set_many(data)?;
        }
        self.amend_inner(true, &mut HashSet::new());
        Ok(())
    }

    /// Amend this document and its embedded children, leaving external
    /// relations alone
    pub(crate) fn amend_shallow(&self) {
        self.amend_inner(false, &mut HashSet::new());
    }

    pub(crate) fn amend_inner(&self, deep: bool, visited: &mut HashSet<NodeId>) {
        if !visited.insert(self.node_id()) {
            return;
        }
        let (children, schema, base_path) = {
            let mut state = self.lock();
            state.persisted = state.data.clone();
            let children: Vec<(String, Value)> = state
                .data
                .iter()
                .filter(|(_, value)| value.is_node())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            (children, state.schema.clone(), state.base_path.clone())
        };
        for (field, child) in children {
            if !deep {
                if let Some(schema) = &schema {
                    if schema.has_relation(&path::join(&base_path, &field), Some(false)) {
                        continue;
                    }
                }
            }
            amend_value(&child, deep, visited);
        }
    }

    /// Discard every change, going back to the persisted baseline
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
            let previous = std::mem::replace(&mut state.data, restored.clone());
            (previous, restored)
        };
        let node = self.node();
        for value in previous.values() {
            graph::detach(&node, value);
        }
        for (field, value) in &restored {
            graph::attach(&node, field, value);
        }
        for value in restored.values() {
            match value {
                Value::Document(doc) => doc.restore_inner(visited),
                Value::Collection(col) => col.restore_inner(visited),
                _ => {}
            }
        }
        graph::notify(&node, "");
    }

    /// Live parent edges of this document
    pub fn parents(&self) -> Parents {
        self.node().parents()
    }

    /// Remove this document from every parent
    pub fn disconnect(&self) {
        self.node().disconnect();
    }

    /// Field under which this document holds `child`
    pub(crate) fn field_of(&self, child: NodeId) -> Option<String> {
        let data = self.lock().data.clone();
        data.iter()
            .find(|(_, value)| value.node().map(|node| node.id()) == Some(child))
            .map(|(field, _)| field.clone())
    }

    /// Drop every field holding `child`
    pub(crate) fn remove_child(&self, child: NodeId) {
        let fields: Vec<String> = {
            let data = self.lock().data.clone();
            data.iter()
                .filter(|(_, value)| value.node().map(|node| node.id()) == Some(child))
                .map(|(field, _)| field.clone())
                .collect()
        };
        for field in fields {
            self.unset_field(&field);
        }
    }

    /// Export the subtree using the schema formatters of `format`
    pub fn to(&self, format: &str, options: &ExportOptions) -> OrmResult<serde_json::Value> {
        self.to_inner(format, options, &mut Vec::new())
    }

    /// Export the subtree to plain data
    pub fn data(&self, options: &ExportOptions) -> OrmResult<serde_json::Value> {
        self.to("array", options)
    }

    pub(crate) fn to_inner(
        &self,
        format: &str,
        options: &ExportOptions,
        ancestors: &mut Vec<NodeId>,
    ) -> OrmResult<serde_json::Value> {
        let (data, schema, base_path) = {
            let state = self.lock();
            (state.data.clone(), state.schema.clone(), state.base_path.clone())
        };
        ancestors.push(self.node_id());
        let nested = ExportOptions {
            embed: options.embed,
            fields: Vec::new(),
        };

        let mut out = serde_json::Map::new();
        for (field, value) in data {
            if !options.fields.is_empty() && !options.fields.contains(&field) {
                continue;
            }
            let field_path = path::join(&base_path, &field);
            if let Some(schema) = &schema {
                if format != "datasource" && schema.column_spec(&field_path).is_some_and(|column| column.private) {
                    continue;
                }
                if !options.embed && schema.has_relation(&field_path, Some(false)) {
                    continue;
                }
            }
            let exported = match &value {
                Value::Document(_) | Value::Collection(_) => {
                    let Some(node) = value.node() else { continue };
                    if ancestors.contains(&node.id()) {
                        continue;
                    }
                    export_node(&node, format, &nested, ancestors)?
                }
                Value::Through(through) => through.to_inner(format, &nested, ancestors)?,
                scalar => match &schema {
                    Some(schema) => schema.format(format, &field_path, scalar)?.to_json(),
                    None => scalar.to_json(),
                },
            };
            out.insert(field, exported);
        }

        if let Some(schema) = schema.as_ref().filter(|_| format != "datasource") {
            for (field, column) in schema.fields(&base_path) {
                if out.contains_key(&field) || column.private || !column.is_virtual || column.getter.is_none() {
                    continue;
                }
                if !options.fields.is_empty() && !options.fields.contains(&field) {
                    continue;
                }
                let value = self.get_field(&field)?;
                out.insert(field, value.to_json());
            }
        }

        ancestors.pop();
        Ok(serde_json::Value::Object(out))
    }
}

fn value_modified(value: &Value, options: &ModifiedOptions, visited: &mut HashSet<NodeId>) -> bool {
    match value {
        Value::Document(doc) => !doc.modified_inner(options, visited).is_empty(),
        Value::Collection(col) => col.modified_inner(options, visited),
        Value::Through(through) => through.modified_inner(options, visited),
        _ => false,
    }
}

fn amend_value(value: &Value, deep: bool, visited: &mut HashSet<NodeId>) {
    match value {
        Value::Document(doc) => doc.amend_inner(deep, visited),
        Value::Collection(col) => col.amend_inner(deep, visited),
        _ => {}
    }
}

pub(crate) fn export_node(
    node: &Node,
    format: &str,
    options: &ExportOptions,
    ancestors: &mut Vec<NodeId>,
) -> OrmResult<serde_json::Value> {
    match node {
        Node::Document(doc) => doc.to_inner(format, options, ancestors),
        Node::Collection(col) => col.to_inner(format, options, ancestors),
    }
}

/// Wrap raw maps and lists into schemaless documents and collections
pub(crate) fn wrap_raw(value: Value) -> OrmResult<Value> {
    match value {
        Value::Object(map) => {
            let doc = Document::new();
            for (field, value) in map {
                if field.is_empty() {
                    return Err(OrmError::EmptyFieldName);
                }
                doc.insert_field(&field, wrap_raw(value)?);
            }
            doc.snapshot();
            Ok(Value::Document(doc))
        }
        Value::Array(items) => {
            let items = items.into_iter().map(wrap_raw).collect::<OrmResult<Vec<_>>>()?;
            Ok(Value::Collection(Collection::with_items(items)?))
        }
        other => Ok(other),
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (model, keys) = match self.inner.state.try_lock() {
            Some(state) => (
                state.schema.as_ref().map(|s| s.name().to_string()),
                state.data.keys().cloned().collect::<Vec<_>>(),
            ),
            None => (None, Vec::new()),
        };
        f.debug_struct("Document")
            .field("node", &self.inner.id)
            .field("model", &model)
            .field("fields", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Document {
        Document::with_data(json!({
            "title": "Sunset",
            "meta": {"width": 800, "tags": ["a", "b"]},
        }))
        .unwrap()
    }

    #[test]
    fn test_get_set_roundtrip() {
        let doc = Document::new();
        doc.set("a.b.c", 5).unwrap();
        assert_eq!(doc.get("a.b.c").unwrap(), Value::Integer(5));
        assert!(doc.get("a.b").unwrap().as_document().is_some());
        assert_eq!(doc.get("a.missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_path_errors() {
        let doc = sample();
        assert_eq!(doc.get("").unwrap_err(), OrmError::EmptyFieldName);
        assert_eq!(doc.set("", 1).unwrap_err(), OrmError::EmptyFieldName);
        assert!(matches!(
            doc.get("title.first").unwrap_err(),
            OrmError::InvalidPathSegment { .. }
        ));
    }

    #[test]
    fn test_has_is_index_aware() {
        let doc = sample();
        assert!(doc.has("meta.tags.0").unwrap());
        assert!(!doc.has("meta.tags.2").unwrap());
        assert!(!doc.has("meta.height").unwrap());
        #[allow(deprecated)]
        let legacy = doc.isset("meta.width").unwrap();
        assert!(legacy);
    }

    #[test]
    fn test_paths_reach_into_json_columns() {
        let mut schema = Schema::new("Photo");
        schema.column("exif", "json").unwrap();
        let schema = schema.build();
        let doc = Document::with_schema(
            &schema,
            json!({"exif": {"camera": {"model": "A500"}, "iso": [100, 200]}}),
            CastOptions::default(),
        )
        .unwrap();

        assert_eq!(doc.get("exif.camera.model").unwrap(), Value::from("A500"));
        assert_eq!(doc.get("exif.iso.1").unwrap(), Value::Integer(200));
        assert_eq!(doc.get("exif.lens").unwrap(), Value::Null);
        assert!(doc.has("exif.iso.0").unwrap());

        doc.set("exif.camera.model", "A700").unwrap();
        assert_eq!(doc.get("exif.camera.model").unwrap(), Value::from("A700"));
        assert!(doc.modified_field("exif"));

        doc.unset("exif.iso").unwrap();
        assert!(!doc.has("exif.iso").unwrap());
        assert!(doc.has("exif.camera").unwrap());
    }

    #[test]
    fn test_amend_clears_modified() {
        let doc = sample();
        assert!(!doc.modified());
        doc.set("meta.width", 1024).unwrap();
        assert!(doc.modified());
        assert!(doc.modified_field("meta"));
        assert!(!doc.modified_field("title"));

        let before = doc.data(&ExportOptions::default()).unwrap();
        doc.amend(None).unwrap();
        assert!(!doc.modified());
        assert_eq!(doc.data(&ExportOptions::default()).unwrap(), before);
    }

    #[test]
    fn test_removed_and_nulled_fields_are_modified() {
        let doc = sample();
        doc.unset("title").unwrap();
        assert!(doc.modified_field("title"));

        let doc = sample();
        doc.set("title", Value::Null).unwrap();
        assert!(doc.modified_field("title"));
    }

    #[test]
    fn test_modified_options() {
        let doc = sample();
        doc.set("title", "Sunrise").unwrap();
        doc.set("extra", true).unwrap();

        assert_eq!(
            doc.modified_fields(&ModifiedOptions::default()),
            vec!["title".to_string(), "extra".to_string()]
        );
        assert!(!doc.modified_with(&ModifiedOptions::ignore(["title", "extra"])));
    }

    #[test]
    fn test_restore() {
        let doc = sample();
        let baseline = doc.data(&ExportOptions::default()).unwrap();
        doc.set("title", "Other").unwrap();
        doc.set("meta.width", 1).unwrap();
        doc.unset("meta.tags").unwrap();

        doc.restore();
        assert_eq!(doc.data(&ExportOptions::default()).unwrap(), baseline);
        assert!(!doc.modified());
    }

    #[test]
    fn test_parent_edges_follow_assignments() {
        let parent = Document::new();
        let child = Document::new();
        parent.set("child", child.clone()).unwrap();
        assert_eq!(child.parents().get(&parent).as_deref(), Some("child"));

        parent.set("child", 1).unwrap();
        assert!(!child.parents().has(&parent));
    }

    #[test]
    fn test_shared_child_and_disconnect() {
        let first = Document::new();
        let second = Document::new();
        let shared = Document::new();
        first.set("item", shared.clone()).unwrap();
        second.set("other", shared.clone()).unwrap();

        shared.set("name", "both").unwrap();
        assert_eq!(second.get("other.name").unwrap(), Value::from("both"));
        assert_eq!(shared.parents().len(), 2);

        shared.disconnect();
        assert!(!first.has("item").unwrap());
        assert!(!second.has("other").unwrap());
        assert!(shared.parents().is_empty());
    }

    #[test]
    fn test_cycles_terminate() {
        let a = Document::new();
        let b = Document::new();
        a.set("b", b.clone()).unwrap();
        b.set("a", a.clone()).unwrap();
        a.amend(None).unwrap();

        assert!(!a.modified());
        b.set("name", "x").unwrap();
        assert!(a.modified());
        assert_eq!(a.data(&ExportOptions::default()).unwrap(), json!({"b": {"name": "x"}}));
    }

    #[test]
    fn test_export_fields_whitelist() {
        let doc = sample();
        let options = ExportOptions {
            fields: vec!["title".into()],
            ..Default::default()
        };
        assert_eq!(doc.data(&options).unwrap(), json!({"title": "Sunset"}));
    }
}
