//! HasMany relationship
//!
//! With a `key` link the related entities hold the key of the entity. With
//! a `keylist` link the entity holds the list of related keys.

use std::collections::{HashMap, HashSet};

use super::{distinct_keys, index_by_key, RelationMeta};
use crate::collection::Collection;
use crate::document::Document;
use crate::error::OrmResult;
use crate::graph::NodeId;
use crate::query::FetchOptions;
use crate::relationships::Link;
use crate::schema::SaveOptions;
use crate::value::Value;

#[derive(Debug)]
pub struct HasMany {
    pub(crate) meta: RelationMeta,
}

impl HasMany {
    pub(crate) fn new(meta: RelationMeta) -> Self {
        Self { meta }
    }

    pub(crate) async fn embed(&self, entities: &[Document], options: &FetchOptions) -> OrmResult<Vec<Document>> {
        match self.meta.link {
            Link::KeyList => self.embed_keylist(entities, options).await,
            _ => self.embed_keys(entities, options).await,
        }
    }

    /// Every owner gets a collection, empty when nothing matched
    async fn embed_keys(&self, entities: &[Document], options: &FetchOptions) -> OrmResult<Vec<Document>> {
        let meta = &self.meta;
        let target = meta.from_schema()?.resolve(&meta.to)?;
        let keys = distinct_keys(entities, &meta.from_key)?;
        let related = if keys.is_empty() {
            Vec::new()
        } else {
            let fetch = meta.fetch_options(options, &meta.to_key, keys);
            target.query(fetch).all().await?.documents()
        };

        let owners = index_by_key(entities, &meta.from_key)?;
        let mut buckets: HashMap<String, Vec<Value>> = HashMap::new();
        for doc in &related {
            if let Some(key) = doc.get(&meta.to_key)?.key_string() {
                buckets.entry(key).or_default().push(Value::Document(doc.clone()));
            }
        }
        for (key, owned) in owners {
            let items = buckets.get(&key).cloned().unwrap_or_default();
            for owner in owned {
                let collection = Collection::loaded(Some(target.clone()), String::new(), items.clone());
                owner.attach_loaded(meta.field(), Value::Collection(collection));
            }
        }
        Ok(related)
    }

    async fn embed_keylist(&self, entities: &[Document], options: &FetchOptions) -> OrmResult<Vec<Document>> {
        let meta = &self.meta;
        let target = meta.from_schema()?.resolve(&meta.to)?;

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut lists = Vec::with_capacity(entities.len());
        for entity in entities {
            let list = match entity.get(&meta.from_key)? {
                Value::Collection(ids) => ids.items(),
                _ => Vec::new(),
            };
            for id in &list {
                if let Some(key) = id.key_string() {
                    if seen.insert(key) {
                        keys.push(id.clone());
                    }
                }
            }
            lists.push(list);
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = meta.fetch_options(options, &meta.to_key, keys);
        let related = target.query(fetch).all().await?.documents();
        let mut index = HashMap::new();
        for doc in &related {
            if let Some(key) = doc.get(&meta.to_key)?.key_string() {
                index.entry(key).or_insert_with(|| doc.clone());
            }
        }
        for (entity, list) in entities.iter().zip(lists) {
            let items = list
                .iter()
                .filter_map(|id| id.key_string().and_then(|key| index.get(&key)))
                .map(|doc| Value::Document(doc.clone()))
                .collect();
            let collection = Collection::loaded(Some(target.clone()), String::new(), items);
            entity.attach_loaded(meta.field(), Value::Collection(collection));
        }
        Ok(related)
    }

    pub(crate) async fn save(
        &self,
        entity: &Document,
        options: &SaveOptions,
        visited: &mut HashSet<NodeId>,
    ) -> OrmResult<bool> {
        match self.meta.link {
            Link::KeyList => self.save_keylist(entity, options, visited).await,
            _ => self.save_keys(entity, options, visited).await,
        }
    }

    /// Save the current children pointing at the entity. Children that
    /// were persisted before but are no longer in the set are deleted when
    /// the relation is a junction, otherwise their key is cleared.
    async fn save_keys(
        &self,
        entity: &Document,
        options: &SaveOptions,
        visited: &mut HashSet<NodeId>,
    ) -> OrmResult<bool> {
        let meta = &self.meta;
        let Some(Value::Collection(children)) = entity.stored(meta.field()) else {
            return Ok(true);
        };
        let target = meta.from_schema()?.resolve(&meta.to)?;
        let conditions = meta.match_on(entity)?;
        let children = children.documents();

        let mut current = HashSet::new();
        for child in &children {
            if let Some(key) = child.get(target.key())?.key_string() {
                current.insert(key);
            }
        }
        let previous = target
            .query(FetchOptions::default().conditions(conditions.clone()))
            .all()
            .await?
            .documents();
        let mut detached = Vec::new();
        for old in previous {
            match old.get(target.key())?.key_string() {
                Some(key) if current.contains(&key) => {}
                _ => detached.push(old),
            }
        }

        if !detached.is_empty() {
            if meta.junction {
                tracing::debug!("Deleting {} detached `{}` rows of `{}`", detached.len(), target.name(), meta.name);
                target.delete(&detached).await?;
            } else {
                tracing::debug!("Unlinking {} detached `{}` entities of `{}`", detached.len(), target.name(), meta.name);
                for old in &detached {
                    old.set(&meta.to_key, Value::Null)?;
                }
                if !target.save_graph(&detached, options, visited).await? {
                    return Ok(false);
                }
            }
        }

        for child in &children {
            for (key, value) in &conditions {
                if !child.get(key)?.same(value) {
                    child.set(key, value.clone())?;
                }
            }
        }
        target.save_graph(&children, options, visited).await
    }

    /// Save the children, then store their keys on the entity
    async fn save_keylist(
        &self,
        entity: &Document,
        options: &SaveOptions,
        visited: &mut HashSet<NodeId>,
    ) -> OrmResult<bool> {
        let meta = &self.meta;
        let Some(Value::Collection(children)) = entity.stored(meta.field()) else {
            return Ok(true);
        };
        let target = meta.from_schema()?.resolve(&meta.to)?;
        let children = children.documents();
        if !target.save_graph(&children, options, visited).await? {
            return Ok(false);
        }
        let mut ids = Vec::with_capacity(children.len());
        for child in &children {
            ids.push(child.get(&meta.to_key)?);
        }
        let unchanged = match entity.get(&meta.from_key)? {
            Value::Collection(existing) => {
                let existing = existing.items();
                existing.len() == ids.len() && existing.iter().zip(&ids).all(|(a, b)| a == b)
            }
            _ => false,
        };
        if !unchanged {
            entity.set(&meta.from_key, Value::Array(ids))?;
        }
        Ok(true)
    }
}
