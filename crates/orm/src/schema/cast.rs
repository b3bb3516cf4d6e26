//! Raw data to typed graph nodes
//!
//! `cast` decides for each field whether the raw value is a relation (build
//! the related document, collection or through view), a declared column
//! (run the setter, then the `cast` formatter) or an undeclared field
//! (pass through, unless the schema is locked).

use std::sync::Arc;

use super::column::Column;
use super::Schema;
use crate::collection::Collection;
use crate::document::{wrap_raw, Document};
use crate::error::{OrmError, OrmResult};
use crate::path;
use crate::relationships::{Link, RelationKind, RelationSpec};
use crate::through::Through;
use crate::value::Value;

/// Options driving a cast
#[derive(Debug, Clone, Default)]
pub struct CastOptions {
    /// Schema path of the document receiving the value
    pub base_path: String,
    /// Existence flag of the entities built, `None` keeps them new
    pub exists: Option<bool>,
    /// Document receiving the value, needed by through relations
    pub parent: Option<Document>,
    /// Cast a single entry of the collection at `base_path`
    pub element: bool,
    /// Fill missing fields with the column defaults
    pub defaults: bool,
}

impl CastOptions {
    /// Options for entities loaded from the datasource
    pub fn loaded() -> Self {
        Self {
            exists: Some(true),
            ..Default::default()
        }
    }

    /// Options for new entities, defaults applied
    pub fn create() -> Self {
        Self {
            defaults: true,
            ..Default::default()
        }
    }
}

enum Target {
    Relation(String, RelationSpec),
    Column(String, Column),
    Nested(String),
}

impl Schema {
    /// Cast `data` for `field` of the document at `options.base_path`.
    /// Without a field, the whole entity (or collection entry) at the base
    /// path is built.
    pub fn cast(self: &Arc<Self>, field: Option<&str>, data: Value, options: CastOptions) -> OrmResult<Value> {
        let target_path = match field {
            Some("") => return Err(OrmError::EmptyFieldName),
            Some(field) => path::join(&options.base_path, field),
            None if options.element => options.base_path.clone(),
            None => return self.cast_entity(data, options),
        };
        if target_path.is_empty() {
            return self.cast_entity(data, options);
        }

        match self.target(&target_path) {
            Some(Target::Relation(candidate, spec)) => self.cast_relation(&candidate, &spec, data, options),
            Some(Target::Column(candidate, column)) => self.cast_column(&candidate, &column, data, options),
            Some(Target::Nested(candidate)) => self.cast_entity(
                data,
                CastOptions {
                    base_path: candidate,
                    parent: None,
                    element: false,
                    ..options
                },
            ),
            None if self.locked() => Err(OrmError::MissingSchemaDefinition {
                model: self.name().to_string(),
                field: target_path,
            }),
            None => wrap_raw(data),
        }
    }

    /// First declaration matching `target_path`, exact path before wildcard
    fn target(&self, target_path: &str) -> Option<Target> {
        let wildcard = path::wildcard(target_path);
        let candidates = if wildcard == target_path {
            vec![target_path.to_string()]
        } else {
            vec![target_path.to_string(), wildcard]
        };
        for candidate in candidates {
            if let Some(spec) = self.relations.get(&candidate) {
                return Some(Target::Relation(candidate, spec.clone()));
            }
            if let Some(column) = self.columns.get(&candidate) {
                return Some(Target::Column(candidate, column.clone()));
            }
            if self.has_nested(&candidate) {
                return Some(Target::Nested(candidate));
            }
        }
        None
    }

    /// Build a document at `options.base_path` from raw fields
    pub(crate) fn cast_entity(self: &Arc<Self>, data: Value, options: CastOptions) -> OrmResult<Value> {
        let fields = match data {
            Value::Null | Value::Document(_) => return Ok(data),
            Value::Object(fields) => fields,
            other => {
                return Err(OrmError::InvalidCast(format!(
                    "`{}` entities are built from objects, got {}",
                    self.name(),
                    other.type_name()
                )))
            }
        };

        let base_path = options.base_path.clone();
        let doc = Document::bound(Some(self.clone()), base_path.clone(), options.exists.unwrap_or(false));
        let nested = CastOptions {
            base_path: base_path.clone(),
            exists: options.exists,
            parent: Some(doc.clone()),
            element: false,
            defaults: options.defaults,
        };

        let mut fields = fields;
        if options.defaults {
            for (field, default) in self.defaults(&base_path) {
                if !fields.contains_key(&field) {
                    fields.insert(field, default);
                }
            }
        }

        // Through views read their pivot, which must be cast first
        let mut deferred = Vec::new();
        for (field, raw) in fields {
            if field.is_empty() {
                return Err(OrmError::EmptyFieldName);
            }
            let field_path = path::join(&base_path, &field);
            let through = self
                .relation_config(&field_path)
                .is_some_and(|spec| spec.kind == RelationKind::HasManyThrough);
            if through {
                deferred.push((field, raw));
                continue;
            }
            let value = self.cast(Some(&field), raw, nested.clone())?;
            doc.insert_field(&field, value);
        }
        for (field, raw) in deferred {
            let value = self.cast(Some(&field), raw, nested.clone())?;
            doc.insert_field(&field, value);
        }

        doc.snapshot();
        Ok(Value::Document(doc))
    }

    fn cast_relation(
        self: &Arc<Self>,
        candidate: &str,
        spec: &RelationSpec,
        data: Value,
        options: CastOptions,
    ) -> OrmResult<Value> {
        if data.is_null() {
            return Ok(Value::Null);
        }

        if spec.kind == RelationKind::HasManyThrough {
            if let Value::Through(_) = data {
                return Ok(data);
            }
            let parent = options.parent.clone().ok_or_else(|| {
                OrmError::InvalidCast(format!("the through relation `{candidate}` needs a parent entity"))
            })?;
            let items = match data {
                Value::Array(items) => items,
                Value::Collection(collection) => collection.items(),
                other => {
                    return Err(OrmError::InvalidCast(format!(
                        "`{candidate}` expects a list, got {}",
                        other.type_name()
                    )))
                }
            };
            let relation = self.relation(candidate)?;
            let through = relation.through_config().ok_or_else(|| OrmError::MissingThrough(candidate.to_string()))?;
            let view = Through::new(&parent, &through.0, &through.1, relation.to_schema()?, Some(items))?;
            return Ok(Value::Through(view));
        }

        let (target, base_path) = if spec.link == Link::Embedded {
            (self.clone(), candidate.to_string())
        } else {
            (self.relation(candidate)?.to_schema()?, String::new())
        };
        let entity_options = CastOptions {
            base_path,
            exists: options.exists,
            parent: None,
            element: false,
            defaults: options.defaults,
        };

        if spec.kind == RelationKind::HasMany && !options.element {
            return match data {
                Value::Collection(_) => Ok(data),
                Value::Array(items) => Ok(Value::Collection(Collection::with_schema(&target, items, entity_options)?)),
                other => Err(OrmError::InvalidCast(format!(
                    "`{candidate}` expects a list, got {}",
                    other.type_name()
                ))),
            };
        }
        target.cast_entity(data, entity_options)
    }

    fn cast_column(
        self: &Arc<Self>,
        candidate: &str,
        column: &Column,
        data: Value,
        options: CastOptions,
    ) -> OrmResult<Value> {
        let data = match &column.setter {
            Some(setter) if !options.element => setter(data),
            _ => data,
        };
        if data.is_null() && column.nullable {
            return Ok(Value::Null);
        }

        if column.array && !options.element {
            return match data {
                Value::Null => Ok(Value::Null),
                Value::Collection(collection) => {
                    let bound = collection
                        .schema()
                        .is_some_and(|schema| Arc::ptr_eq(&schema, self))
                        && collection.base_path() == candidate;
                    if bound {
                        Ok(Value::Collection(collection))
                    } else {
                        self.cast_array(candidate, collection.items(), options)
                    }
                }
                Value::Array(items) => self.cast_array(candidate, items, options),
                other => self.cast_array(candidate, vec![other], options),
            };
        }
        self.apply_formatter("cast", &column.kind, &data, column)
    }

    fn cast_array(self: &Arc<Self>, candidate: &str, items: Vec<Value>, options: CastOptions) -> OrmResult<Value> {
        let collection = Collection::with_schema(
            self,
            items,
            CastOptions {
                base_path: candidate.to_string(),
                parent: None,
                element: false,
                ..options
            },
        )?;
        Ok(Value::Collection(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn image() -> Arc<Schema> {
        let mut schema = Schema::new("Image");
        schema.column("title", "string").unwrap();
        schema.column("score", "float").unwrap();
        schema.column("published", Column::new("boolean").default(true)).unwrap();
        schema.column("meta", Column::new("object")).unwrap();
        schema.column("meta.width", "integer").unwrap();
        schema.column("tags", Column::new("object").array()).unwrap();
        schema.column("tags.name", "string").unwrap();
        schema.column("labels", Column::new("string").array()).unwrap();
        schema.column("translations.*", "string").unwrap();
        schema
            .column("slug", Column::new("string").setter(|value| match value {
                Value::String(raw) => Value::String(raw.to_lowercase().replace(' ', "-")),
                other => other,
            }))
            .unwrap();
        schema.build()
    }

    #[test]
    fn test_float_cast() {
        let schema = image();
        let doc = Document::with_schema(&schema, json!({"score": "8.9"}), CastOptions::default()).unwrap();
        assert_eq!(doc.get("score").unwrap(), Value::Float(8.9));
    }

    #[test]
    fn test_cast_is_idempotent() {
        let schema = image();
        let doc = Document::with_schema(&schema, json!({"score": "8.9"}), CastOptions::default()).unwrap();
        let once = doc.get("score").unwrap();
        doc.set("score", once.clone()).unwrap();
        assert_eq!(doc.get("score").unwrap(), once);
    }

    #[test]
    fn test_embedded_relations_are_schema_bound() {
        let schema = image();
        let doc = Document::with_schema(
            &schema,
            json!({
                "meta": {"width": "800"},
                "tags": [{"name": "sky"}, {"name": 42}],
                "labels": ["a", 1],
                "translations": {"fr": 3},
            }),
            CastOptions::default(),
        )
        .unwrap();

        assert_eq!(doc.get("meta.width").unwrap(), Value::Integer(800));
        let meta = doc.get("meta").unwrap();
        assert_eq!(meta.as_document().unwrap().base_path(), "meta");

        let tags = doc.get("tags").unwrap();
        let tags = tags.as_collection().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(doc.get("tags.1.name").unwrap(), Value::from("42"));

        assert_eq!(doc.get("labels.1").unwrap(), Value::from("1"));
        assert_eq!(doc.get("translations.fr").unwrap(), Value::from("3"));
    }

    #[test]
    fn test_push_casts_collection_entries() {
        let schema = image();
        let doc = Document::with_schema(&schema, json!({"tags": []}), CastOptions::default()).unwrap();
        let tags = doc.get("tags").unwrap();
        let tags = tags.as_collection().unwrap();
        tags.push(json!({"name": 7})).unwrap();
        assert_eq!(doc.get("tags.0.name").unwrap(), Value::from("7"));
    }

    #[test]
    fn test_locked_schema_rejects_undeclared_fields() {
        let schema = image();
        let err = Document::with_schema(&schema, json!({"unknown": 1}), CastOptions::default()).unwrap_err();
        assert_eq!(
            err,
            OrmError::MissingSchemaDefinition {
                model: "Image".into(),
                field: "unknown".into()
            }
        );

        let doc = Document::with_schema(&schema, json!({}), CastOptions::default()).unwrap();
        assert!(matches!(doc.get("unknown").unwrap_err(), OrmError::MissingSchemaField { .. }));
    }

    #[test]
    fn test_unlocked_schema_passes_through() {
        let schema = Schema::new("Loose").with_locked(false).build();
        let doc = Document::with_schema(&schema, json!({"extra": {"deep": [1, 2]}}), CastOptions::default()).unwrap();
        assert_eq!(doc.get("extra.deep.1").unwrap(), Value::Integer(2));
        assert_eq!(doc.get("missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_setter_and_defaults() {
        let schema = image();
        let doc = Document::with_schema(&schema, json!({"slug": "Hello World"}), CastOptions::create()).unwrap();
        assert_eq!(doc.get("slug").unwrap(), Value::from("hello-world"));
        assert_eq!(doc.get("published").unwrap(), Value::Bool(true));
        assert!(doc.has("published").unwrap());

        let doc = Document::with_schema(&schema, json!({}), CastOptions::default()).unwrap();
        assert!(!doc.has("published").unwrap());
        assert_eq!(doc.get("published").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_nullable_short_circuit() {
        let mut schema = Schema::new("Post");
        schema
            .column("rank", Column::new("integer").nullable().setter(|_| Value::Null))
            .unwrap();
        let schema = schema.build();
        let doc = Document::with_schema(&schema, json!({"rank": "3"}), CastOptions::default()).unwrap();
        assert_eq!(doc.get("rank").unwrap(), Value::Null);
    }

    #[test]
    fn test_entities_need_objects() {
        let schema = image();
        assert!(matches!(
            schema.cast(None, Value::Integer(1), CastOptions::default()).unwrap_err(),
            OrmError::InvalidCast(_)
        ));
        assert_eq!(schema.cast(None, Value::Null, CastOptions::default()).unwrap(), Value::Null);
    }

    #[test]
    fn test_loaded_entities_exist() {
        let mut schema = Schema::new("Gallery");
        schema.column("name", "string").unwrap();
        schema.bind("images", RelationSpec::has_many("Image")).unwrap();
        let schema = schema.build();
        let doc = Document::with_schema(&schema, json!({"name": "a"}), CastOptions::loaded()).unwrap();
        assert!(doc.exists());
        assert!(!doc.modified());
    }
}
