//! Persistence orchestration
//!
//! `save` validates, then walks the graph: relations holding the keys of
//! the entity (`belongsTo`, `keylist` hasMany) are saved first so the keys
//! are known, the entities are persisted with one bulk call per kind of
//! write, then the relations pointing at the entity are saved.

use std::collections::HashSet;
use std::sync::Arc;

use super::cast::CastOptions;
use super::Schema;
use crate::collection::Collection;
use crate::document::{Document, ExportOptions, ModifiedOptions};
use crate::error::{OrmError, OrmResult};
use crate::graph::NodeId;
use crate::model::ValidateOptions;
use crate::relationships::{Link, RelationKind};
use crate::value::{Map, Value};
use crate::BoxFuture;

/// Which external relations take part in a cascade
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Embed {
    /// Every loaded relation
    #[default]
    All,
    /// The entity alone
    Off,
    /// Only the named relations
    Only(Vec<String>),
}

impl Embed {
    pub fn allows(&self, relation: &str) -> bool {
        match self {
            Embed::All => true,
            Embed::Off => false,
            Embed::Only(names) => names.iter().any(|name| name == relation),
        }
    }
}

impl From<bool> for Embed {
    fn from(embed: bool) -> Self {
        if embed {
            Embed::All
        } else {
            Embed::Off
        }
    }
}

/// Options for `save`
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Run the validator first, a failure aborts the save
    pub validate: bool,
    /// Only these fields are written when set
    pub whitelist: Option<Vec<String>>,
    /// Overrides the locked flag of the schema when filtering fields
    pub locked: Option<bool>,
    /// Relations saved along with the entities
    pub embed: Embed,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            whitelist: None,
            locked: None,
            embed: Embed::All,
        }
    }
}

impl SaveOptions {
    /// Skip validation
    pub fn unvalidated() -> Self {
        Self {
            validate: false,
            ..Default::default()
        }
    }

    pub fn whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn embed(mut self, embed: impl Into<Embed>) -> Self {
        self.embed = embed.into();
        self
    }
}

/// Extracts the values written to the datasource for one entity
pub type FieldExtractor = dyn Fn(&Document) -> OrmResult<Map> + Send + Sync;

impl Schema {
    /// A new entity with the column defaults applied
    pub fn create(self: &Arc<Self>, data: impl Into<Value>) -> OrmResult<Document> {
        Document::with_schema(self, data, CastOptions::create())
    }

    /// Validate then save `entities` and their loaded relations. Returns
    /// `false` when validation fails, the errors are on the entities.
    pub async fn save(self: &Arc<Self>, entities: &[Document], options: &SaveOptions) -> OrmResult<bool> {
        if options.validate {
            let validate = ValidateOptions {
                embed: options.embed.clone(),
            };
            let mut visited = HashSet::new();
            let mut valid = true;
            for entity in entities {
                if !entity.validates_inner(&validate, &mut visited).await? {
                    valid = false;
                }
            }
            if !valid {
                tracing::debug!("Validation failed, `{}` entities not saved", self.name);
                return Ok(false);
            }
        }
        self.save_graph(entities, options, &mut HashSet::new()).await
    }

    /// Save every entity of a collection
    pub async fn broadcast(self: &Arc<Self>, collection: &Collection, options: &SaveOptions) -> OrmResult<bool> {
        self.save(&collection.documents(), options).await
    }

    /// Cascade without validation. Entities already visited are skipped,
    /// which stops cycles between related entities.
    pub(crate) fn save_graph<'a>(
        self: &'a Arc<Self>,
        entities: &'a [Document],
        options: &'a SaveOptions,
        visited: &'a mut HashSet<NodeId>,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            let pending: Vec<Document> = entities
                .iter()
                .filter(|entity| visited.insert(entity.node_id()))
                .cloned()
                .collect();
            if pending.is_empty() {
                return Ok(true);
            }

            let (before, after) = self.cascade_relations(&options.embed)?;
            for name in &before {
                let relation = self.relation(name)?;
                for entity in &pending {
                    tracing::trace!("Saving `{}` before `{}`", name, self.name);
                    if !relation.save(entity, options, visited).await? {
                        return Ok(false);
                    }
                }
            }

            if !self.persist(&pending, options).await? {
                return Ok(false);
            }

            for name in &after {
                let relation = self.relation(name)?;
                for entity in &pending {
                    tracing::trace!("Saving `{}` after `{}`", name, self.name);
                    if !relation.save(entity, options, visited).await? {
                        return Ok(false);
                    }
                }
            }
            Ok(true)
        })
    }

    /// External relations split by whether they hold keys of the entity
    fn cascade_relations(self: &Arc<Self>, embed: &Embed) -> OrmResult<(Vec<String>, Vec<String>)> {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for name in self.relations(false) {
            if !embed.allows(&name) {
                continue;
            }
            let relation = self.relation(&name)?;
            match (relation.kind(), relation.link()) {
                (RelationKind::BelongsTo, _) | (RelationKind::HasMany, Link::KeyList) => before.push(name),
                (RelationKind::HasOne, _) | (RelationKind::HasMany, _) => after.push(name),
                (RelationKind::HasManyThrough, _) => {}
            }
        }
        Ok((before, after))
    }

    /// Write the entities themselves: new ones are inserted, existing ones
    /// are updated when modified. Unchanged entities cost nothing.
    pub async fn persist(self: &Arc<Self>, entities: &[Document], options: &SaveOptions) -> OrmResult<bool> {
        let unchanged = ModifiedOptions {
            embed: false,
            ..Default::default()
        };
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        for entity in entities {
            if !entity.exists() {
                inserts.push(entity.clone());
            } else if entity.modified_with(&unchanged) {
                updates.push(entity.clone());
            }
        }
        if inserts.is_empty() && updates.is_empty() {
            return Ok(true);
        }

        tracing::debug!(
            "Persisting `{}`: {} inserts, {} updates",
            self.name,
            inserts.len(),
            updates.len()
        );
        let connection = self.connection()?;
        let extractor = self.field_extractor(options);

        if !inserts.is_empty() {
            if !connection.bulk_insert(self, &inserts, extractor.as_ref()).await? {
                return Ok(false);
            }
            for entity in &inserts {
                entity.set_exists(true);
                entity.amend_shallow();
            }
        }
        if !updates.is_empty() {
            if !connection.bulk_update(self, &updates, extractor.as_ref()).await? {
                return Ok(false);
            }
            for entity in &updates {
                entity.amend_shallow();
            }
        }
        Ok(true)
    }

    fn field_extractor(self: &Arc<Self>, options: &SaveOptions) -> Box<FieldExtractor> {
        let schema = self.clone();
        let whitelist = options.whitelist.clone();
        let locked = options.locked.unwrap_or(self.locked);
        Box::new(move |entity: &Document| {
            let exported = entity.to(
                "datasource",
                &ExportOptions {
                    embed: false,
                    fields: Vec::new(),
                },
            )?;
            let Value::Object(fields) = Value::from(exported) else {
                return Ok(Map::new());
            };
            Ok(fields
                .into_iter()
                .filter(|(field, _)| schema.persistable(field, whitelist.as_deref(), locked))
                .collect())
        })
    }

    fn persistable(&self, field: &str, whitelist: Option<&[String]>, locked: bool) -> bool {
        if whitelist.is_some_and(|fields| !fields.iter().any(|name| name == field)) {
            return false;
        }
        match self.column_spec(field) {
            Some(column) => !column.is_virtual,
            None => !locked || self.has_relation(field, Some(true)),
        }
    }

    /// Delete existing entities with a single `truncate` call
    pub async fn delete(self: &Arc<Self>, entities: &[Document]) -> OrmResult<bool> {
        if entities.is_empty() {
            return Ok(true);
        }
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity.get(&self.key)?;
            if id.is_null() {
                return Err(OrmError::MissingPrimaryKey(self.name.clone()));
            }
            ids.push(id);
        }
        let mut conditions = Map::new();
        conditions.insert(self.key.clone(), Value::Array(ids));

        tracing::debug!("Deleting {} `{}` entities", entities.len(), self.name);
        if !self.connection()?.truncate(&self.source, &conditions).await? {
            return Ok(false);
        }
        for entity in entities {
            entity.set_exists(false);
            entity.clear_persisted();
        }
        Ok(true)
    }
}
