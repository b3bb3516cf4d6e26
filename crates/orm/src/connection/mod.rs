//! Datasource abstraction
//!
//! The mapper never builds queries itself. A [`Connection`] receives the
//! source name and structured options, and returns raw rows. Every method
//! fails with `NotImplemented` unless the backend provides it.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{OrmError, OrmResult};
use crate::query::FetchOptions;
use crate::schema::{FieldExtractor, Schema};
use crate::value::Map;

/// Abstract datasource connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Rows of `source` matching `options`
    async fn query(&self, source: &str, _options: &FetchOptions) -> OrmResult<Vec<Map>> {
        Err(OrmError::NotImplemented(format!("query on `{source}`")))
    }

    /// Number of rows of `source` matching `options`
    async fn count(&self, source: &str, options: &FetchOptions) -> OrmResult<usize> {
        Ok(self.query(source, options).await?.len())
    }

    /// Insert new entities. Generated keys are written back with
    /// [`Document::sync`].
    async fn bulk_insert(
        &self,
        schema: &Schema,
        _entities: &[Document],
        _fields: &FieldExtractor,
    ) -> OrmResult<bool> {
        Err(OrmError::NotImplemented(format!("bulk insert on `{}`", schema.source())))
    }

    /// Update existing entities, keyed by their primary key
    async fn bulk_update(
        &self,
        schema: &Schema,
        _entities: &[Document],
        _fields: &FieldExtractor,
    ) -> OrmResult<bool> {
        Err(OrmError::NotImplemented(format!("bulk update on `{}`", schema.source())))
    }

    /// Delete the rows of `source` matching `conditions`
    async fn truncate(&self, source: &str, _conditions: &Map) -> OrmResult<bool> {
        Err(OrmError::NotImplemented(format!("truncate on `{source}`")))
    }
}
