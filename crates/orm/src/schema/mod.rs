//! Model schemas
//!
//! A schema declares the columns and relations of a model. It drives the
//! construction of documents from raw data (`cast`), the export of typed
//! values (`format`), eager loading (`embed`) and persistence (`save`,
//! `delete`). Schemas are built with `&mut` builder calls, then frozen in an
//! `Arc` by [`Schema::build`] or by registering them on a
//! [`Registry`](crate::registry::Registry).

pub mod cast;
pub mod column;
pub mod embed;
pub mod formatters;
pub mod persist;

use dashmap::DashMap;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::config::OrmConfig;
use crate::connection::Connection;
use crate::conventions::Conventions;
use crate::error::{OrmError, OrmResult};
use crate::path::{self, WILDCARD};
use crate::registry::{Registry, RegistryInner};
use crate::relationships::{Link, RelationKind, RelationSpec, Relationship};
use crate::value::{Map, Value};

pub use cast::CastOptions;
pub use column::{Column, Getter, Setter};
pub use embed::{EmbedNode, EmbedTree};
pub use formatters::{Formatter, Formatters};
pub use persist::{Embed, FieldExtractor, SaveOptions};

/// Declarative definition of a model
pub struct Schema {
    name: String,
    source: String,
    key: String,
    locked: bool,
    columns: IndexMap<String, Column>,
    relations: IndexMap<String, RelationSpec>,
    formatters: Formatters,
    conventions: Arc<Conventions>,
    connection: Option<Arc<dyn Connection>>,
    config: OrmConfig,
    registry: Option<Weak<RegistryInner>>,
    resolved: DashMap<String, Arc<Relationship>>,
}

impl Schema {
    /// A schema with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, OrmConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: OrmConfig) -> Self {
        let name = name.into();
        let conventions = Conventions::default();
        let source = conventions.apply("source", &name).unwrap_or_else(|_| name.clone());
        Self {
            source,
            key: config.primary_key.clone(),
            locked: config.locked,
            columns: IndexMap::new(),
            relations: IndexMap::new(),
            formatters: Formatters::builtin(&config),
            conventions: Arc::new(conventions),
            connection: None,
            config,
            registry: None,
            resolved: DashMap::new(),
            name,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Replace the naming rules, the source name is derived again
    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        if let Ok(source) = conventions.apply("source", &self.name) {
            self.source = source;
        }
        self.conventions = Arc::new(conventions);
        self
    }

    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Declare a column. `object` columns also bind an embedded relation
    /// on the same name, `has_many` when the column is an array.
    pub fn column(&mut self, name: &str, column: impl Into<Column>) -> OrmResult<&mut Self> {
        if name.is_empty() {
            return Err(OrmError::EmptyFieldName);
        }
        if self.relations.get(name).is_some_and(|spec| spec.link != Link::Embedded) {
            return Err(OrmError::BindingCollision {
                name: name.to_string(),
                existing: "relation".to_string(),
            });
        }
        let column = column.into();
        if column.is_object() {
            let spec = if column.array {
                RelationSpec::has_many(self.name.clone())
            } else {
                RelationSpec::has_one(self.name.clone())
            };
            self.relations.insert(name.to_string(), spec.link(Link::Embedded));
            self.resolved.remove(name);
        }
        self.columns.insert(name.to_string(), column);
        Ok(self)
    }

    /// Bind a relation
    pub fn bind(&mut self, name: &str, spec: RelationSpec) -> OrmResult<&mut Self> {
        if name.is_empty() {
            return Err(OrmError::EmptyFieldName);
        }
        if self.relations.contains_key(name) {
            return Err(OrmError::BindingCollision {
                name: name.to_string(),
                existing: "relation".to_string(),
            });
        }
        if let Some(column) = self.columns.get(name) {
            if !(column.is_object() && spec.link == Link::Embedded) {
                return Err(OrmError::BindingCollision {
                    name: name.to_string(),
                    existing: "column".to_string(),
                });
            }
        }

        let mut spec = spec;
        match spec.kind {
            RelationKind::HasManyThrough => {
                let through = spec.through.clone().unwrap_or_default();
                if through.is_empty() {
                    return Err(OrmError::MissingThrough(name.to_string()));
                }
                if spec.using.as_deref().unwrap_or_default().is_empty() {
                    return Err(OrmError::MissingUsing(name.to_string()));
                }
                let pivot = self.relations.get_mut(&through).ok_or_else(|| OrmError::UnknownRelation {
                    model: self.name.clone(),
                    name: through.clone(),
                })?;
                pivot.junction = true;
                self.resolved.remove(&through);
            }
            _ if spec.link == Link::Embedded => {
                if spec.to.is_none() {
                    spec.to = Some(self.name.clone());
                }
            }
            _ => {
                let to = spec.to.clone().filter(|to| !to.is_empty()).ok_or_else(|| OrmError::MissingTo(name.to_string()))?;
                match (spec.kind, spec.link) {
                    (RelationKind::BelongsTo, _) => {
                        let key = match &spec.keys {
                            Some((from, _)) => from.clone(),
                            None => self.conventions.apply("reference", &to)?,
                        };
                        self.implicit_column(&key, Column::new("id").nullable());
                    }
                    (RelationKind::HasMany, Link::KeyList) => {
                        let key = match &spec.keys {
                            Some((from, _)) => from.clone(),
                            None => self.conventions.apply("references", &to)?,
                        };
                        self.implicit_column(&key, Column::new("id").array().nullable());
                    }
                    _ => {}
                }
            }
        }

        tracing::debug!("Binding {} relation `{}` on `{}`", spec.kind, name, self.name);
        self.relations.insert(name.to_string(), spec);
        self.resolved.remove(name);
        Ok(self)
    }

    fn implicit_column(&mut self, name: &str, column: Column) {
        if !self.columns.contains_key(name) {
            self.columns.insert(name.to_string(), column);
        }
    }

    /// Remove a relation, returns whether it was bound
    pub fn unbind(&mut self, name: &str) -> bool {
        self.resolved.remove(name);
        self.relations.shift_remove(name).is_some()
    }

    /// Register a formatter for a type in `mode`
    pub fn formatter<F>(&mut self, mode: &str, kind: &str, formatter: F) -> &mut Self
    where
        F: Fn(&Value, &Column) -> OrmResult<Value> + Send + Sync + 'static,
    {
        self.formatters.set(mode, kind, formatter);
        self
    }

    pub(crate) fn attach_registry(&mut self, registry: Weak<RegistryInner>) {
        self.registry = Some(registry);
    }

    /// Freeze the schema. The primary key is declared as a `serial`
    /// column when it wasn't declared explicitly.
    pub fn build(mut self) -> Arc<Self> {
        let key = self.key.clone();
        self.implicit_column(&key, Column::new("serial"));
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the datasource table or collection
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Primary key field
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    pub fn formatters(&self) -> &Formatters {
        &self.formatters
    }

    /// The registry this schema was registered on
    pub fn registry(&self) -> Option<Registry> {
        self.registry
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Registry::from_inner)
    }

    /// The connection of this schema, or the default one of its registry
    pub fn connection(&self) -> OrmResult<Arc<dyn Connection>> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }
        self.registry()
            .and_then(|registry| registry.connection())
            .ok_or_else(|| OrmError::NotImplemented(format!("connection for `{}`", self.name)))
    }

    pub fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    pub fn has_column(&self, path: &str) -> bool {
        self.column_spec(path).is_some()
    }

    /// Column declared at `path`, wildcard declarations included
    pub fn column_spec(&self, path: &str) -> Option<Column> {
        self.columns
            .get(path)
            .or_else(|| self.columns.get(&path::wildcard(path)))
            .or_else(|| self.columns.get(&path::schema_path(path)))
            .cloned()
    }

    /// Columns directly under `base_path`, keyed by their field name
    pub fn fields(&self, base_path: &str) -> Vec<(String, Column)> {
        self.columns
            .iter()
            .filter_map(|(name, column)| {
                let field = if base_path.is_empty() {
                    name.as_str()
                } else {
                    name.strip_prefix(base_path)?.strip_prefix('.')?
                };
                (!field.contains('.') && field != WILDCARD).then(|| (field.to_string(), column.clone()))
            })
            .collect()
    }

    /// Declared column names
    pub fn names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Default values of the columns under `base_path`
    pub fn defaults(&self, base_path: &str) -> Map {
        self.fields(base_path)
            .into_iter()
            .filter_map(|(field, column)| column.default.map(|default| (field, default)))
            .collect()
    }

    /// Whether columns or relations are declared below `path`
    pub fn has_nested(&self, path: &str) -> bool {
        let prefix = format!("{path}.");
        let wildcard = format!("{}.", path::wildcard(path));
        self.columns
            .keys()
            .chain(self.relations.keys())
            .any(|name| name.starts_with(&prefix) || (path.contains('.') && name.starts_with(&wildcard)))
    }

    fn relation_key(&self, name: &str) -> Option<String> {
        if self.relations.contains_key(name) {
            return Some(name.to_string());
        }
        let wildcard = path::wildcard(name);
        self.relations.contains_key(&wildcard).then_some(wildcard)
    }

    /// Names of the bound relations, embedded ones only when asked
    pub fn relations(&self, include_embedded: bool) -> Vec<String> {
        self.relations
            .iter()
            .filter(|(_, spec)| include_embedded || spec.link != Link::Embedded)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn relation_config(&self, name: &str) -> Option<&RelationSpec> {
        self.relation_key(name).and_then(|key| self.relations.get(&key))
    }

    /// Whether a relation is bound on `name`. With `embedded` set, only
    /// embedded (`Some(true)`) or external (`Some(false)`) relations count.
    pub fn has_relation(&self, name: &str, embedded: Option<bool>) -> bool {
        match self.relation_config(name) {
            None => false,
            Some(spec) => match embedded {
                None => true,
                Some(embedded) => (spec.link == Link::Embedded) == embedded,
            },
        }
    }

    /// The relationship bound on `name`, built on first use
    pub fn relation(self: &Arc<Self>, name: &str) -> OrmResult<Arc<Relationship>> {
        let key = self.relation_key(name).ok_or_else(|| OrmError::UnknownRelation {
            model: self.name.clone(),
            name: name.to_string(),
        })?;
        if let Some(relation) = self.resolved.get(&key) {
            return Ok(relation.clone());
        }
        let spec = self.relations.get(&key).cloned().ok_or_else(|| OrmError::UnknownRelation {
            model: self.name.clone(),
            name: key.clone(),
        })?;
        let relation = Arc::new(Relationship::build(self, &key, spec)?);
        self.resolved.insert(key, relation.clone());
        Ok(relation)
    }

    /// Resolve another model through the registry. A schema always resolves
    /// its own name.
    pub fn resolve(self: &Arc<Self>, model: &str) -> OrmResult<Arc<Schema>> {
        if model == self.name {
            return Ok(self.clone());
        }
        self.registry()
            .ok_or_else(|| OrmError::UnknownModel(model.to_string()))?
            .schema(model)
    }

    /// Export a typed value with the formatters of `mode`
    pub fn format(&self, mode: &str, field: &str, value: &Value) -> OrmResult<Value> {
        if mode == "cast" {
            return Err(OrmError::InvalidCast(format!(
                "`{field}` can't be formatted in cast mode, use `cast()`"
            )));
        }
        match self.column_spec(field) {
            Some(column) => self.convert(mode, &column.kind, value, &column),
            None => Ok(value.clone()),
        }
    }

    /// Convert a value of `kind` with the formatters of `mode`
    pub fn convert(&self, mode: &str, kind: &str, value: &Value, column: &Column) -> OrmResult<Value> {
        if mode == "cast" {
            return Err(OrmError::InvalidCast(format!(
                "`{kind}` values can't be converted in cast mode, use `cast()`"
            )));
        }
        self.apply_formatter(mode, kind, value, column)
    }

    pub(crate) fn apply_formatter(&self, mode: &str, kind: &str, value: &Value, column: &Column) -> OrmResult<Value> {
        match self.formatters.get(mode, kind) {
            Some(formatter) => formatter(value, column),
            None => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("key", &self.key)
            .field("locked", &self.locked)
            .field("columns", &self.columns.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image() -> Schema {
        let mut schema = Schema::new("Image");
        schema.column("title", "string").unwrap();
        schema.column("score", "float").unwrap();
        schema.column("meta", Column::new("object")).unwrap();
        schema.column("meta.width", "integer").unwrap();
        schema.column("tags", Column::new("object").array()).unwrap();
        schema.column("tags.name", "string").unwrap();
        schema.column("translations.*", "string").unwrap();
        schema
            .bind("gallery", RelationSpec::belongs_to("Gallery"))
            .unwrap();
        schema
    }

    #[test]
    fn test_derived_names() {
        let schema = Schema::new("ImageTag").build();
        assert_eq!(schema.source(), "image_tag");
        assert_eq!(schema.key(), "id");
        assert_eq!(schema.column_spec("id").map(|c| c.kind), Some("serial".to_string()));
    }

    #[test]
    fn test_object_columns_bind_embedded_relations() {
        let schema = image().build();
        assert!(schema.has_relation("meta", Some(true)));
        assert!(schema.has_relation("tags", Some(true)));
        assert!(schema.has_relation("gallery", Some(false)));
        assert_eq!(schema.relations(false), vec!["gallery".to_string()]);
        assert_eq!(schema.relation_config("tags").map(|spec| spec.kind), Some(RelationKind::HasMany));
    }

    #[test]
    fn test_belongs_to_declares_foreign_key() {
        let schema = image().build();
        let column = schema.column_spec("gallery_id").unwrap();
        assert_eq!(column.kind, "id");
        assert!(column.nullable);
    }

    #[test]
    fn test_binding_collisions() {
        let mut schema = image();
        assert!(matches!(
            schema.bind("title", RelationSpec::belongs_to("Gallery")).unwrap_err(),
            OrmError::BindingCollision { .. }
        ));
        assert!(matches!(
            schema.column("gallery", "string").unwrap_err(),
            OrmError::BindingCollision { .. }
        ));
        assert_eq!(
            schema.bind("owner", RelationSpec::belongs_to("")).unwrap_err(),
            OrmError::MissingTo("owner".into())
        );
    }

    #[test]
    fn test_through_requires_pivot() {
        let mut schema = Schema::new("Gallery");
        let err = schema
            .bind("tags", RelationSpec::has_many_through("images_tags", "tag"))
            .unwrap_err();
        assert!(matches!(err, OrmError::UnknownRelation { .. }));

        assert_eq!(
            schema.bind("tags", RelationSpec::has_many_through("", "tag")).unwrap_err(),
            OrmError::MissingThrough("tags".into())
        );

        schema.bind("images_tags", RelationSpec::has_many("ImageTag")).unwrap();
        assert!(!schema.relation_config("images_tags").unwrap().junction);
        schema
            .bind("tags", RelationSpec::has_many_through("images_tags", "tag"))
            .unwrap();
        assert!(schema.relation_config("images_tags").unwrap().junction);
    }

    #[test]
    fn test_fields_and_wildcards() {
        let schema = image().build();
        let names: Vec<String> = schema.fields("").into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "score", "meta", "tags", "gallery_id", "id"]);

        let nested: Vec<String> = schema.fields("meta").into_iter().map(|(name, _)| name).collect();
        assert_eq!(nested, vec!["width"]);

        assert_eq!(schema.column_spec("translations.fr").map(|c| c.kind), Some("string".to_string()));
        assert!(schema.has_nested("translations"));
        assert!(!schema.has_nested("title"));
    }

    #[test]
    fn test_defaults() {
        let mut schema = Schema::new("Post");
        schema.column("published", Column::new("boolean").default(false)).unwrap();
        schema.column("title", "string").unwrap();
        let schema = schema.build();
        let defaults = schema.defaults("");
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults.get("published"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_format_rejects_cast_mode() {
        let schema = image().build();
        assert!(matches!(
            schema.format("cast", "score", &Value::Float(1.0)).unwrap_err(),
            OrmError::InvalidCast(_)
        ));
        assert_eq!(schema.format("array", "title", &"x".into()).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_unresolved_models() {
        let schema = image().build();
        assert_eq!(
            schema.resolve("Gallery").unwrap_err(),
            OrmError::UnknownModel("Gallery".into())
        );
        assert!(schema.resolve("Image").unwrap().name() == "Image");
        assert!(matches!(schema.connection().err().unwrap(), OrmError::NotImplemented(_)));
    }
}
