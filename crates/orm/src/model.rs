//! Model lifecycle
//!
//! A document bound to a schema is a model: it has an identity (its
//! primary key), an existence flag and a persistence lifecycle.
//!
//! ```text
//! NEW --save--> PERSISTED --set--> PERSISTED (modified) --save--> PERSISTED
//! PERSISTED --delete--> DELETED (exists = false, no baseline)
//! ```
//!
//! A failed validation leaves the state alone and returns `false`, the
//! messages are read back with [`Document::errors`].

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::document::{Document, ExportOptions};
use crate::error::{OrmError, OrmResult};
use crate::graph::{self, NodeId};
use crate::query::{EmbedSpec, FetchOptions};
use crate::schema::{Embed, SaveOptions, Schema};
use crate::value::Value;
use crate::BoxFuture;

/// Options for `validates`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateOptions {
    /// Loaded relations validated along with the entity
    pub embed: Embed,
}

impl Document {
    fn model_schema(&self) -> OrmResult<Arc<Schema>> {
        self.schema().ok_or(OrmError::Unbound)
    }

    /// Primary key value, `Null` while unknown
    pub fn id(&self) -> Value {
        let key = self
            .schema()
            .map(|schema| schema.key().to_string())
            .unwrap_or_else(|| "id".to_string());
        self.stored(&key).unwrap_or_default()
    }

    /// Whether the entity is known to the datasource
    pub fn exists(&self) -> bool {
        self.lock().exists
    }

    pub fn set_exists(&self, exists: bool) {
        self.lock().exists = exists;
    }

    /// Record what the datasource returned for this entity: the generated
    /// key, extra data and the existence flag. The result is the new
    /// persisted baseline.
    pub fn sync(&self, id: impl Into<Value>, data: Option<Value>, exists: bool) -> OrmResult<()> {
        let id = id.into();
        if !id.is_null() {
            let key = self.model_schema()?.key().to_string();
            self.set(&key, id)?;
        }
        if let Some(data) = data {
            self.set_many(data)?;
        }
        self.set_exists(exists);
        self.amend_shallow();
        Ok(())
    }

    /// Drop the persisted baseline, every field reads as modified
    pub(crate) fn clear_persisted(&self) {
        self.lock().persisted.clear();
    }

    /// Validate then save the entity and its loaded relations
    pub async fn save(&self, options: &SaveOptions) -> OrmResult<bool> {
        let schema = self.model_schema()?;
        schema.save(std::slice::from_ref(self), options).await
    }

    /// Delete the entity. Entities that don't exist are left alone and
    /// `false` is returned.
    pub async fn delete(&self) -> OrmResult<bool> {
        if !self.exists() {
            tracing::warn!("Can't delete a `{}` entity that doesn't exist", self.model_schema()?.name());
            return Ok(false);
        }
        let schema = self.model_schema()?;
        schema.delete(std::slice::from_ref(self)).await
    }

    /// Replace the data with a fresh copy from the datasource. Loaded
    /// relations are dropped.
    pub async fn reload(&self) -> OrmResult<()> {
        let schema = self.model_schema()?;
        let id = self.id();
        if id.is_null() {
            return Err(OrmError::MissingPrimaryKey(schema.name().to_string()));
        }
        let fresh = schema
            .query(FetchOptions::new().where_eq(schema.key(), id.clone()))
            .first()
            .await?
            .ok_or_else(|| OrmError::NotFound {
                model: schema.name().to_string(),
                id: id.key_string().unwrap_or_default(),
            })?;

        let fields = fresh.fields();
        let stale: Vec<String> = self
            .fields()
            .keys()
            .filter(|field| !fields.contains_key(*field))
            .cloned()
            .collect();
        for field in stale {
            self.unset(&field)?;
        }
        for (field, value) in fields {
            self.insert_field(&field, value);
        }
        self.set_exists(true);
        self.amend_shallow();
        graph::notify(&self.node(), "");
        Ok(())
    }

    /// Run the validator registered for the model and the ones of the
    /// loaded relations
    pub async fn validates(&self, options: &ValidateOptions) -> OrmResult<bool> {
        self.validates_inner(options, &mut HashSet::new()).await
    }

    pub(crate) fn validates_inner<'a>(
        &'a self,
        options: &'a ValidateOptions,
        visited: &'a mut HashSet<NodeId>,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            if !visited.insert(self.node_id()) {
                return Ok(true);
            }
            let Some(schema) = self.schema() else {
                return Ok(true);
            };

            let mut success = true;
            match schema.registry().and_then(|registry| registry.validator(schema.name())) {
                Some(validator) => {
                    let data = self.to(
                        "array",
                        &ExportOptions {
                            embed: false,
                            fields: Vec::new(),
                        },
                    )?;
                    let outcome = validator.validate(&data, options).await?;
                    success = outcome.is_success();
                    if !success {
                        tracing::debug!(
                            "`{}` entity failed validation on {} fields",
                            schema.name(),
                            outcome.errors.len()
                        );
                    }
                    self.invalidate(outcome.errors);
                }
                None => self.invalidate(IndexMap::new()),
            }

            for name in schema.relations(false) {
                if !options.embed.allows(&name) {
                    continue;
                }
                let relation = schema.relation(&name)?;
                if !relation.validates(self, options, visited).await? {
                    success = false;
                }
            }
            Ok(success)
        })
    }

    /// Messages of the last validation, per field
    pub fn errors(&self) -> IndexMap<String, Vec<String>> {
        self.lock().errors.clone()
    }

    /// Replace the validation messages
    pub fn invalidate(&self, errors: IndexMap<String, Vec<String>>) {
        self.lock().errors = errors;
    }

    /// Load a relation and return its data
    pub async fn fetch(&self, relation: &str) -> OrmResult<Value> {
        let schema = self.model_schema()?;
        schema.relation(relation)?.fetch(self).await
    }

    /// Eager load relations on this entity
    pub async fn embed(&self, relations: &[EmbedSpec]) -> OrmResult<()> {
        let schema = self.model_schema()?;
        schema.embed(std::slice::from_ref(self), relations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CastOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn image() -> Arc<Schema> {
        let mut schema = Schema::new("Image");
        schema.column("title", "string").unwrap();
        schema.build()
    }

    #[test]
    fn test_identity() {
        let schema = image();
        let entity = Document::with_schema(&schema, json!({"title": "a"}), CastOptions::default()).unwrap();
        assert!(entity.id().is_null());
        assert!(!entity.exists());

        entity.sync(7, Some(Value::from(json!({"title": "b"}))), true).unwrap();
        assert_eq!(entity.id(), Value::Integer(7));
        assert_eq!(entity.get("title").unwrap(), Value::from("b"));
        assert!(entity.exists());
        assert!(!entity.modified());
    }

    #[test]
    fn test_invalidate() {
        let entity = Document::with_schema(&image(), json!({}), CastOptions::default()).unwrap();
        let mut errors = IndexMap::new();
        errors.insert("title".to_string(), vec!["is required".to_string()]);
        entity.invalidate(errors.clone());
        assert_eq!(entity.errors(), errors);
    }

    #[tokio::test]
    async fn test_validates_without_validator() {
        let entity = Document::with_schema(&image(), json!({}), CastOptions::default()).unwrap();
        assert!(entity.validates(&ValidateOptions::default()).await.unwrap());
        assert!(entity.errors().is_empty());
    }

    #[tokio::test]
    async fn test_delete_new_entity() {
        let entity = Document::with_schema(&image(), json!({}), CastOptions::default()).unwrap();
        assert!(!entity.delete().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_needs_schema() {
        let entity = Document::new();
        assert_eq!(
            entity.save(&SaveOptions::default()).await.unwrap_err(),
            OrmError::Unbound
        );
    }
}
