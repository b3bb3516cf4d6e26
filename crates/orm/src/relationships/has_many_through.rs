//! HasManyThrough relationship
//!
//! Owns no data: the related entities are the `using` relation of every
//! entity of the `through` relation, exposed as a [`Through`] view.

use std::sync::Arc;

use super::RelationMeta;
use crate::document::Document;
use crate::error::{OrmError, OrmResult};
use crate::schema::Schema;
use crate::through::Through;
use crate::value::Value;

#[derive(Debug)]
pub struct HasManyThrough {
    pub(crate) meta: RelationMeta,
}

impl HasManyThrough {
    pub(crate) fn new(meta: RelationMeta) -> Self {
        Self { meta }
    }

    fn config(&self) -> OrmResult<(&str, &str)> {
        let through = self
            .meta
            .through
            .as_deref()
            .ok_or_else(|| OrmError::MissingThrough(self.meta.name.clone()))?;
        let using = self
            .meta
            .using
            .as_deref()
            .ok_or_else(|| OrmError::MissingUsing(self.meta.name.clone()))?;
        Ok((through, using))
    }

    /// Schema reached by the `using` relation of the pivot schema
    pub fn target_schema(&self) -> OrmResult<Arc<Schema>> {
        let (through, using) = self.config()?;
        let pivot = self.meta.from_schema()?.relation(through)?.to_schema()?;
        pivot.relation(using)?.to_schema()
    }

    /// The view over the pivot of `entity`. Existing entities need their
    /// pivot loaded first.
    pub(crate) fn view(&self, entity: &Document) -> OrmResult<Value> {
        let (through, using) = self.config()?;
        if entity.exists() && entity.stored(through).is_none() {
            return Err(OrmError::ExternalRelationRequiresFetch(self.meta.name.clone()));
        }
        let view = Through::new(entity, through, using, self.target_schema()?, None)?;
        let value = Value::Through(view);
        entity.attach_loaded(self.meta.field(), value.clone());
        Ok(value)
    }

    /// Attach a view on every entity. The pivot was loaded beforehand, so
    /// nothing is fetched here.
    pub(crate) fn embed(&self, entities: &[Document]) -> OrmResult<Vec<Document>> {
        let (through, _) = self.config()?;
        for entity in entities {
            if entity.stored(through).is_some() || !entity.exists() {
                self.view(entity)?;
            }
        }
        Ok(Vec::new())
    }
}
