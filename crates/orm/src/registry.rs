//! Model registry
//!
//! The registry is the composition root of the mapper: schemas are
//! registered by model name and resolve each other through it, and the
//! default connection, validators and query defaults are looked up here.
//! Schemas only keep a weak link, so dropping the registry releases them.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::config::OrmConfig;
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::query::FetchOptions;
use crate::schema::Schema;
use crate::validator::Validator;

pub(crate) struct RegistryInner {
    schemas: DashMap<String, Arc<Schema>>,
    validators: DashMap<String, Arc<dyn Validator>>,
    query_defaults: DashMap<String, FetchOptions>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    config: OrmConfig,
}

/// Thread-safe registry of model schemas
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(OrmConfig::default())
    }

    pub fn with_config(config: OrmConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                schemas: DashMap::new(),
                validators: DashMap::new(),
                query_defaults: DashMap::new(),
                connection: RwLock::new(None),
                config,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// A new schema using the configuration of this registry
    pub fn define(&self, name: impl Into<String>) -> Schema {
        Schema::with_config(name, self.inner.config.clone())
    }

    /// Freeze `schema` and register it under its model name, replacing any
    /// previous registration
    pub fn register(&self, mut schema: Schema) -> Arc<Schema> {
        schema.attach_registry(Arc::downgrade(&self.inner));
        let schema = schema.build();
        tracing::debug!("Registering model `{}` on source `{}`", schema.name(), schema.source());
        self.inner.schemas.insert(schema.name().to_string(), schema.clone());
        schema
    }

    pub fn schema(&self, name: &str) -> OrmResult<Arc<Schema>> {
        self.inner
            .schemas
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.inner.schemas.contains_key(name)
    }

    /// Registered model names
    pub fn models(&self) -> Vec<String> {
        self.inner.schemas.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Default connection of the registered schemas
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.inner.connection.read().clone()
    }

    pub fn set_connection(&self, connection: Arc<dyn Connection>) {
        *self.inner.connection.write() = Some(connection);
    }

    pub fn set_validator(&self, model: &str, validator: Arc<dyn Validator>) {
        self.inner.validators.insert(model.to_string(), validator);
    }

    pub fn validator(&self, model: &str) -> Option<Arc<dyn Validator>> {
        self.inner.validators.get(model).map(|entry| entry.value().clone())
    }

    /// Options merged into every query on `model`
    pub fn set_query_defaults(&self, model: &str, options: FetchOptions) {
        self.inner.query_defaults.insert(model.to_string(), options);
    }

    pub fn query_defaults(&self, model: &str) -> Option<FetchOptions> {
        self.inner.query_defaults.get(model).map(|entry| entry.value().clone())
    }

    /// Forget everything registered for `model`
    pub fn reset(&self, model: &str) {
        self.inner.schemas.remove(model);
        self.inner.validators.remove(model);
        self.inner.query_defaults.remove(model);
    }

    /// Forget every model, the connection is kept
    pub fn clear(&self) {
        self.inner.schemas.clear();
        self.inner.validators.clear();
        self.inner.query_defaults.clear();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.models())
            .field("connection", &self.connection().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationSpec;

    #[test]
    fn test_register_and_resolve() {
        let registry = Registry::new();
        let mut gallery = registry.define("Gallery");
        gallery.bind("images", RelationSpec::has_many("Image")).unwrap();
        let gallery = registry.register(gallery);
        let image = registry.register(registry.define("Image"));

        assert!(Arc::ptr_eq(&registry.schema("Image").unwrap(), &image));
        assert!(Arc::ptr_eq(&gallery.resolve("Image").unwrap(), &image));
        assert!(Arc::ptr_eq(&gallery.relation("images").unwrap().to_schema().unwrap(), &image));
        assert_eq!(
            registry.schema("Tag").unwrap_err(),
            OrmError::UnknownModel("Tag".into())
        );
    }

    #[test]
    fn test_reset_and_clear() {
        let registry = Registry::new();
        registry.register(registry.define("Gallery"));
        registry.register(registry.define("Image"));
        registry.set_query_defaults("Image", FetchOptions::new().limit(5));

        registry.reset("Image");
        assert!(!registry.has_schema("Image"));
        assert!(registry.query_defaults("Image").is_none());
        assert!(registry.has_schema("Gallery"));

        registry.clear();
        assert!(registry.models().is_empty());
    }

    #[test]
    fn test_schemas_without_connection() {
        let registry = Registry::new();
        let image = registry.register(registry.define("Image"));
        assert!(matches!(image.connection().err().unwrap(), OrmError::NotImplemented(_)));
    }
}
