//! BelongsTo relationship - the entity holds the key of its related entity

use std::collections::HashSet;

use super::{distinct_keys, RelationMeta};
use crate::document::Document;
use crate::error::{OrmError, OrmResult};
use crate::graph::NodeId;
use crate::query::FetchOptions;
use crate::schema::SaveOptions;
use crate::value::Value;

#[derive(Debug)]
pub struct BelongsTo {
    pub(crate) meta: RelationMeta,
}

impl BelongsTo {
    pub(crate) fn new(meta: RelationMeta) -> Self {
        Self { meta }
    }

    /// Fetch the entities referenced by `entities` and assign each one to
    /// its owners. Owners without a matching entity are left untouched.
    pub(crate) async fn embed(&self, entities: &[Document], options: &FetchOptions) -> OrmResult<Vec<Document>> {
        let meta = &self.meta;
        let keys = distinct_keys(entities, &meta.from_key)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let target = meta.from_schema()?.resolve(&meta.to)?;
        let fetch = meta.fetch_options(options, &meta.to_key, keys);
        let related = target.query(fetch).all().await?.documents();

        let mut index = std::collections::HashMap::new();
        for doc in &related {
            if let Some(key) = doc.get(&meta.to_key)?.key_string() {
                index.entry(key).or_insert_with(|| doc.clone());
            }
        }
        for entity in entities {
            let Some(key) = entity.get(&meta.from_key)?.key_string() else {
                continue;
            };
            if let Some(doc) = index.get(&key) {
                entity.attach_loaded(meta.field(), Value::Document(doc.clone()));
            }
        }
        Ok(related)
    }

    /// Save the related entity first, then copy its key into the entity
    pub(crate) async fn save(
        &self,
        entity: &Document,
        options: &SaveOptions,
        visited: &mut HashSet<NodeId>,
    ) -> OrmResult<bool> {
        let meta = &self.meta;
        let Some(Value::Document(related)) = entity.stored(meta.field()) else {
            return Ok(true);
        };
        let target = meta.from_schema()?.resolve(&meta.to)?;
        if !target.save_graph(std::slice::from_ref(&related), options, visited).await? {
            return Ok(false);
        }
        let key = related.get(&meta.to_key)?;
        if key.is_null() {
            return Err(OrmError::MissingRelatedKey {
                relation: meta.name.clone(),
            });
        }
        if !entity.get(&meta.from_key)?.same(&key) {
            entity.set(&meta.from_key, key)?;
        }
        Ok(true)
    }
}
