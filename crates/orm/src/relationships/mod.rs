//! Relationships between models
//!
//! A relation is declared on a schema with a [`RelationSpec`] and resolved
//! into a [`Relationship`] on first use. Resolution fills the keys that
//! were not configured from the naming conventions and the target schema.

pub mod belongs_to;
pub mod has_many;
pub mod has_many_through;
pub mod has_one;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::collection::Collection;
use crate::document::Document;
use crate::error::{OrmError, OrmResult};
use crate::graph::{Node, NodeId};
use crate::model::ValidateOptions;
use crate::query::{EmbedSpec, FetchOptions};
use crate::schema::{SaveOptions, Schema};
use crate::value::{Map, Value};
use crate::BoxFuture;

pub use belongs_to::BelongsTo;
pub use has_many::HasMany;
pub use has_many_through::HasManyThrough;
pub use has_one::HasOne;

/// Kind of relationship between two models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// The entity holds the key of one related entity
    BelongsTo,
    /// One related entity holds the key of the entity
    HasOne,
    /// Many related entities hold the key of the entity
    HasMany,
    /// Related entities reached through a pivot relation
    HasManyThrough,
}

impl RelationKind {
    /// Parse a kind name, camel case and snake case are both accepted
    pub fn parse(name: &str) -> OrmResult<Self> {
        match name {
            "belongsTo" | "belongs_to" => Ok(Self::BelongsTo),
            "hasOne" | "has_one" => Ok(Self::HasOne),
            "hasMany" | "has_many" => Ok(Self::HasMany),
            "hasManyThrough" | "has_many_through" => Ok(Self::HasManyThrough),
            other => Err(OrmError::UnknownRelationKind(other.to_string())),
        }
    }

    /// Returns true if the relation holds a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::HasManyThrough)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongsTo",
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::HasManyThrough => "hasManyThrough",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How related data is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Link {
    /// Through a foreign key
    Key,
    /// Through a list of foreign keys held by the entity
    KeyList,
    /// Stored inside the entity
    Embedded,
    /// The structural parent of the entity
    Contained,
}

/// Declaration of a relation, before resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub to: Option<String>,
    /// `(from_key, to_key)` pair, derived from conventions when absent
    pub keys: Option<(String, String)>,
    pub link: Link,
    pub fields: Vec<String>,
    /// Whether the related rows are owned by the relation
    pub junction: bool,
    pub through: Option<String>,
    pub using: Option<String>,
}

impl RelationSpec {
    fn with_kind(kind: RelationKind, to: Option<String>) -> Self {
        Self {
            kind,
            to,
            keys: None,
            link: Link::Key,
            fields: Vec::new(),
            junction: false,
            through: None,
            using: None,
        }
    }

    /// A relation of a kind given by name
    pub fn new(kind: &str, to: impl Into<String>) -> OrmResult<Self> {
        Ok(Self::with_kind(RelationKind::parse(kind)?, Some(to.into())))
    }

    pub fn belongs_to(to: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::BelongsTo, Some(to.into()))
    }

    pub fn has_one(to: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::HasOne, Some(to.into()))
    }

    pub fn has_many(to: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::HasMany, Some(to.into()))
    }

    /// Entities reached by the `using` relation of every entity of the
    /// `through` relation
    pub fn has_many_through(through: impl Into<String>, using: impl Into<String>) -> Self {
        let mut spec = Self::with_kind(RelationKind::HasManyThrough, None);
        spec.through = Some(through.into());
        spec.using = Some(using.into());
        spec
    }

    pub fn keys(mut self, from_key: impl Into<String>, to_key: impl Into<String>) -> Self {
        self.keys = Some((from_key.into(), to_key.into()));
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn junction(mut self, junction: bool) -> Self {
        self.junction = junction;
        self
    }
}

/// Resolved configuration shared by every relationship kind
#[derive(Debug)]
pub struct RelationMeta {
    pub name: String,
    pub kind: RelationKind,
    pub from: String,
    pub to: String,
    pub from_key: String,
    pub to_key: String,
    pub link: Link,
    pub junction: bool,
    pub fields: Vec<String>,
    pub through: Option<String>,
    pub using: Option<String>,
    from_schema: Weak<Schema>,
    counterpart: OnceCell<Option<String>>,
}

impl RelationMeta {
    /// Field holding the related data, the last segment of the name
    pub fn field(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn from_schema(&self) -> OrmResult<Arc<Schema>> {
        self.from_schema.upgrade().ok_or(OrmError::Unbound)
    }

    /// `{to_key: entity[from_key]}`, the conditions matching related rows
    pub fn match_on(&self, entity: &Document) -> OrmResult<Map> {
        let value = entity.get(&self.from_key)?;
        if value.is_null() {
            return Err(OrmError::MissingKeyForMatch {
                relation: self.name.clone(),
                key: self.from_key.clone(),
            });
        }
        let mut conditions = Map::new();
        conditions.insert(self.to_key.clone(), value);
        Ok(conditions)
    }

    /// Query options for a bulk fetch of the related rows
    pub(crate) fn fetch_options(&self, options: &FetchOptions, key: &str, values: Vec<Value>) -> FetchOptions {
        let mut fetch = options.clone();
        fetch.conditions.insert(key.to_string(), Value::Array(values));
        if fetch.fields.is_empty() {
            fetch.fields = self.fields.clone();
        }
        fetch
    }
}

/// Distinct non-null values of `field` on `entities`, in first-seen order
pub(crate) fn distinct_keys(entities: &[Document], field: &str) -> OrmResult<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for entity in entities {
        let value = entity.get(field)?;
        if let Some(key) = value.key_string() {
            if seen.insert(key) {
                keys.push(value);
            }
        }
    }
    Ok(keys)
}

/// A resolved relationship
#[derive(Debug)]
pub enum Relationship {
    BelongsTo(BelongsTo),
    HasOne(HasOne),
    HasMany(HasMany),
    HasManyThrough(HasManyThrough),
}

impl Relationship {
    /// Resolve a declaration bound on `schema` under `name`
    pub(crate) fn build(schema: &Arc<Schema>, name: &str, spec: RelationSpec) -> OrmResult<Self> {
        let from = schema.name().to_string();
        if from.is_empty() {
            return Err(OrmError::MissingFrom(name.to_string()));
        }
        let to = spec.to.clone().unwrap_or_default();
        let conventions = schema.conventions();
        let target_key = |to: &str| -> OrmResult<String> {
            match schema.resolve(to) {
                Ok(target) => Ok(target.key().to_string()),
                Err(_) => conventions.apply("key", to),
            }
        };

        let (from_key, to_key) = match (spec.kind, spec.link) {
            (RelationKind::HasManyThrough, _) => {
                let through = spec
                    .through
                    .clone()
                    .filter(|through| !through.is_empty())
                    .ok_or_else(|| OrmError::MissingThrough(name.to_string()))?;
                if spec.using.as_deref().unwrap_or_default().is_empty() {
                    return Err(OrmError::MissingUsing(name.to_string()));
                }
                let pivot = schema.relation(&through)?;
                (pivot.from_key().to_string(), pivot.to_key().to_string())
            }
            (_, Link::Embedded) | (_, Link::Contained) => (String::new(), String::new()),
            _ if to.is_empty() => return Err(OrmError::MissingTo(name.to_string())),
            _ if spec.keys.is_some() => spec.keys.clone().unwrap_or_default(),
            (RelationKind::BelongsTo, _) => (conventions.apply("reference", &to)?, target_key(&to)?),
            (RelationKind::HasMany, Link::KeyList) => (conventions.apply("references", &to)?, target_key(&to)?),
            (RelationKind::HasOne, _) | (RelationKind::HasMany, _) => {
                (schema.key().to_string(), conventions.apply("reference", &from)?)
            }
        };

        let meta = RelationMeta {
            name: name.to_string(),
            kind: spec.kind,
            from,
            to,
            from_key,
            to_key,
            link: spec.link,
            junction: spec.junction,
            fields: spec.fields,
            through: spec.through,
            using: spec.using,
            from_schema: Arc::downgrade(schema),
            counterpart: OnceCell::new(),
        };
        Ok(match meta.kind {
            RelationKind::BelongsTo => Relationship::BelongsTo(BelongsTo::new(meta)),
            RelationKind::HasOne => Relationship::HasOne(HasOne::new(meta)),
            RelationKind::HasMany => Relationship::HasMany(HasMany::new(meta)),
            RelationKind::HasManyThrough => Relationship::HasManyThrough(HasManyThrough::new(meta)),
        })
    }

    pub fn meta(&self) -> &RelationMeta {
        match self {
            Relationship::BelongsTo(relation) => &relation.meta,
            Relationship::HasOne(relation) => &relation.meta,
            Relationship::HasMany(relation) => &relation.meta,
            Relationship::HasManyThrough(relation) => &relation.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn field(&self) -> &str {
        self.meta().field()
    }

    pub fn kind(&self) -> RelationKind {
        self.meta().kind
    }

    pub fn from(&self) -> &str {
        &self.meta().from
    }

    /// Target model name. Through relations borrow it from their `using`
    /// relation.
    pub fn to(&self) -> String {
        match self {
            Relationship::HasManyThrough(_) => self
                .to_schema()
                .map(|schema| schema.name().to_string())
                .unwrap_or_default(),
            _ => self.meta().to.clone(),
        }
    }

    pub fn from_key(&self) -> &str {
        &self.meta().from_key
    }

    pub fn to_key(&self) -> &str {
        &self.meta().to_key
    }

    /// `{from_key: to_key}`
    pub fn keys(&self) -> (String, String) {
        (self.from_key().to_string(), self.to_key().to_string())
    }

    pub fn link(&self) -> Link {
        self.meta().link
    }

    pub fn junction(&self) -> bool {
        self.meta().junction
    }

    pub fn fields(&self) -> &[String] {
        &self.meta().fields
    }

    /// Whether the related data lives inside the entity
    pub fn embedded(&self) -> bool {
        self.link() == Link::Embedded
    }

    /// `(through, using)` of a through relation
    pub fn through_config(&self) -> Option<(String, String)> {
        let meta = self.meta();
        Some((meta.through.clone()?, meta.using.clone()?))
    }

    pub fn from_schema(&self) -> OrmResult<Arc<Schema>> {
        self.meta().from_schema()
    }

    /// Schema of the related entities
    pub fn to_schema(&self) -> OrmResult<Arc<Schema>> {
        match self {
            Relationship::HasManyThrough(relation) => relation.target_schema(),
            _ => self.from_schema()?.resolve(&self.meta().to),
        }
    }

    /// The relation of the target model pointing back at this one
    pub fn counterpart(&self) -> OrmResult<Option<Arc<Relationship>>> {
        let meta = self.meta();
        let name = meta.counterpart.get_or_try_init(|| -> OrmResult<Option<String>> {
            if self.embedded() || self.kind() == RelationKind::HasManyThrough {
                return Ok(None);
            }
            let target = self.to_schema()?;
            for candidate in target.relations(false) {
                let relation = target.relation(&candidate)?;
                let pointing_back = relation.meta().to == meta.from
                    && relation.from_key() == meta.to_key
                    && relation.to_key() == meta.from_key;
                let compatible = match meta.kind {
                    RelationKind::BelongsTo => {
                        matches!(relation.kind(), RelationKind::HasOne | RelationKind::HasMany)
                    }
                    _ => relation.kind() == RelationKind::BelongsTo,
                };
                if pointing_back && compatible {
                    return Ok(Some(candidate));
                }
            }
            Ok(None)
        })?;
        match name {
            Some(name) => Ok(Some(self.to_schema()?.relation(name)?)),
            None => Ok(None),
        }
    }

    /// Conditions matching the related rows of `entity`
    pub fn match_on(&self, entity: &Document) -> OrmResult<Map> {
        self.meta().match_on(entity)
    }

    /// Related data of `entity` without any I/O. Embedded data is created
    /// when missing. External relations of existing entities must be loaded
    /// with [`Relationship::fetch`] or an embed first.
    pub fn get(&self, entity: &Document) -> OrmResult<Value> {
        let field = self.field();
        if let Some(value) = entity.stored(field) {
            return Ok(value);
        }
        match self.link() {
            Link::Embedded => {
                let empty = if self.kind().is_collection() {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(Map::new())
                };
                let value = entity.cast_field(field, empty)?;
                entity.attach_loaded(field, value.clone());
                Ok(value)
            }
            Link::Contained => Ok(container_of(entity).map(Value::Document).unwrap_or_default()),
            Link::Key | Link::KeyList => {
                if let Relationship::HasManyThrough(relation) = self {
                    return relation.view(entity);
                }
                if entity.exists() {
                    return Err(OrmError::ExternalRelationRequiresFetch(self.name().to_string()));
                }
                match self.kind() {
                    RelationKind::HasMany => {
                        let collection = Collection::loaded(Some(self.to_schema()?), String::new(), Vec::new());
                        let value = Value::Collection(collection);
                        entity.attach_loaded(field, value.clone());
                        Ok(value)
                    }
                    _ => Ok(Value::Null),
                }
            }
        }
    }

    /// Load the related data of `entity`
    pub async fn fetch(&self, entity: &Document) -> OrmResult<Value> {
        if !self.embedded() {
            let schema = self.from_schema()?;
            let specs = [EmbedSpec::from(self.name())];
            schema.embed(std::slice::from_ref(entity), &specs).await?;
        }
        match entity.stored(self.field()) {
            Some(value) => Ok(value),
            None if self.embedded() => self.get(entity),
            None => Ok(Value::Null),
        }
    }

    /// Load the related data of every entity with one fetch, returns the
    /// fetched entities
    pub fn embed<'a>(
        &'a self,
        entities: &'a [Document],
        options: &'a FetchOptions,
    ) -> BoxFuture<'a, OrmResult<Vec<Document>>> {
        Box::pin(async move {
            match self {
                Relationship::BelongsTo(relation) => relation.embed(entities, options).await,
                Relationship::HasOne(relation) => relation.embed(entities, options).await,
                Relationship::HasMany(relation) => relation.embed(entities, options).await,
                Relationship::HasManyThrough(relation) => relation.embed(entities),
            }
        })
    }

    /// Save the related data of `entity`
    pub fn save<'a>(
        &'a self,
        entity: &'a Document,
        options: &'a SaveOptions,
        visited: &'a mut HashSet<NodeId>,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            match self {
                Relationship::BelongsTo(relation) => relation.save(entity, options, visited).await,
                Relationship::HasOne(relation) => relation.save(entity, options, visited).await,
                Relationship::HasMany(relation) => relation.save(entity, options, visited).await,
                Relationship::HasManyThrough(_) => Ok(true),
            }
        })
    }

    /// Validate the loaded related entities of `entity`
    pub fn validates<'a>(
        &'a self,
        entity: &'a Document,
        options: &'a ValidateOptions,
        visited: &'a mut HashSet<NodeId>,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            if self.kind() == RelationKind::HasManyThrough {
                return Ok(true);
            }
            let related = match entity.stored(self.field()) {
                Some(Value::Document(doc)) => vec![doc],
                Some(Value::Collection(collection)) => collection.documents(),
                _ => return Ok(true),
            };
            let mut success = true;
            for doc in related {
                if !doc.validates_inner(options, visited).await? {
                    success = false;
                }
            }
            Ok(success)
        })
    }
}

/// Closest document holding `entity`, looking through collections
fn container_of(entity: &Document) -> Option<Document> {
    for (parent, _) in entity.parents().iter() {
        match parent {
            Node::Document(doc) => return Some(doc.clone()),
            Node::Collection(collection) => {
                for (grand, _) in collection.parents().iter() {
                    if let Node::Document(doc) = grand {
                        return Some(doc.clone());
                    }
                }
            }
        }
    }
    None
}

/// Shared by has-one and has-many embedding
pub(crate) fn index_by_key(entities: &[Document], key: &str) -> OrmResult<indexmap::IndexMap<String, Vec<Document>>> {
    let mut index: indexmap::IndexMap<String, Vec<Document>> = indexmap::IndexMap::new();
    for entity in entities {
        if let Some(value) = entity.get(key)?.key_string() {
            index.entry(value).or_default().push(entity.clone());
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gallery() -> Arc<Schema> {
        let mut schema = Schema::new("Gallery");
        schema.column("name", "string").unwrap();
        schema.bind("images", RelationSpec::has_many("Image")).unwrap();
        schema.bind("cover", RelationSpec::belongs_to("Image").keys("cover_id", "id")).unwrap();
        schema.build()
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(RelationKind::parse("hasManyThrough").unwrap(), RelationKind::HasManyThrough);
        assert_eq!(RelationKind::parse("belongs_to").unwrap(), RelationKind::BelongsTo);
        assert_eq!(
            RelationKind::parse("manyToMany").unwrap_err(),
            OrmError::UnknownRelationKind("manyToMany".into())
        );
        assert!(RelationSpec::new("hasOne", "Image").is_ok());
        assert!(RelationSpec::new("hasSome", "Image").is_err());
    }

    #[test]
    fn test_default_keys() {
        let schema = gallery();
        let images = schema.relation("images").unwrap();
        assert_eq!(images.keys(), ("id".to_string(), "gallery_id".to_string()));
        assert_eq!(images.to(), "Image");
        assert_eq!(images.field(), "images");

        let cover = schema.relation("cover").unwrap();
        assert_eq!(cover.keys(), ("cover_id".to_string(), "id".to_string()));
    }

    #[test]
    fn test_relations_are_memoized() {
        let schema = gallery();
        let first = schema.relation("images").unwrap();
        let second = schema.relation("images").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            schema.relation("missing").unwrap_err(),
            OrmError::UnknownRelation { .. }
        ));
    }

    #[test]
    fn test_match_on() {
        let schema = gallery();
        let images = schema.relation("images").unwrap();
        let entity = Document::with_schema(&schema, serde_json::json!({"name": "a"}), Default::default()).unwrap();
        assert_eq!(
            images.match_on(&entity).unwrap_err(),
            OrmError::MissingKeyForMatch {
                relation: "images".into(),
                key: "id".into()
            }
        );
        entity.set("id", 3).unwrap();
        let conditions = images.match_on(&entity).unwrap();
        assert_eq!(conditions.get("gallery_id"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_get_dispatch() {
        let schema = gallery();
        let entity = Document::with_schema(&schema, serde_json::json!({}), Default::default()).unwrap();
        // New entities read empty external relations
        assert!(entity.get("cover").unwrap().is_null());

        let loaded = Document::with_schema(&schema, serde_json::json!({"id": 1}), crate::schema::CastOptions::loaded()).unwrap();
        assert_eq!(
            loaded.get("cover").unwrap_err(),
            OrmError::ExternalRelationRequiresFetch("cover".into())
        );
    }
}
