//! HasOne relationship - the related entity holds the key of the entity

use std::collections::HashSet;

use super::{distinct_keys, index_by_key, RelationMeta};
use crate::document::Document;
use crate::error::OrmResult;
use crate::graph::NodeId;
use crate::query::FetchOptions;
use crate::schema::SaveOptions;
use crate::value::Value;

#[derive(Debug)]
pub struct HasOne {
    pub(crate) meta: RelationMeta,
}

impl HasOne {
    pub(crate) fn new(meta: RelationMeta) -> Self {
        Self { meta }
    }

    pub(crate) async fn embed(&self, entities: &[Document], options: &FetchOptions) -> OrmResult<Vec<Document>> {
        let meta = &self.meta;
        let keys = distinct_keys(entities, &meta.from_key)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let target = meta.from_schema()?.resolve(&meta.to)?;
        let fetch = meta.fetch_options(options, &meta.to_key, keys);
        let related = target.query(fetch).all().await?.documents();

        let owners = index_by_key(entities, &meta.from_key)?;
        for doc in &related {
            let Some(key) = doc.get(&meta.to_key)?.key_string() else {
                continue;
            };
            for owner in owners.get(&key).into_iter().flatten() {
                owner.attach_loaded(meta.field(), Value::Document(doc.clone()));
            }
        }
        Ok(related)
    }

    /// Point the related entity at the entity, then save it
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
        for (key, value) in meta.match_on(entity)? {
            if !related.get(&key)?.same(&value) {
                related.set(&key, value)?;
            }
        }
        let target = meta.from_schema()?.resolve(&meta.to)?;
        target.save_graph(std::slice::from_ref(&related), options, visited).await
    }
}
