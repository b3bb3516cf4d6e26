//! Fetch options and the query handle
//!
//! A [`Query`] is built by [`Schema::query`]. It hands its options to the
//! connection, casts the returned rows into existing entities, then eager
//! loads the requested relations.

use std::fmt;
use std::sync::Arc;

use crate::collection::Collection;
use crate::document::Document;
use crate::error::OrmResult;
use crate::schema::{CastOptions, Schema};
use crate::value::{Map, Value};

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// A relation to eager load, as a dotted path (`images.tags`), with the
/// options of its fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedSpec {
    pub path: String,
    pub options: FetchOptions,
}

impl EmbedSpec {
    pub fn new(path: impl Into<String>, options: FetchOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

impl From<&str> for EmbedSpec {
    fn from(path: &str) -> Self {
        Self::new(path, FetchOptions::default())
    }
}

impl From<String> for EmbedSpec {
    fn from(path: String) -> Self {
        Self::new(path, FetchOptions::default())
    }
}

/// Options of a fetch. Conditions are equalities, a list value matches
/// any of its entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub conditions: Map,
    pub embed: Vec<EmbedSpec>,
    pub fields: Vec<String>,
    pub order: Vec<(String, OrderDirection)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every condition
    pub fn conditions(mut self, conditions: Map) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn where_eq<T: Into<Value>>(mut self, field: &str, value: T) -> Self {
        self.conditions.insert(field.to_string(), value.into());
        self
    }

    pub fn where_in<T: Into<Value>>(mut self, field: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.insert(field.to_string(), Value::Array(values));
        self
    }

    /// Eager load a relation
    pub fn with(mut self, relation: impl Into<EmbedSpec>) -> Self {
        self.embed.push(relation.into());
        self
    }

    /// Restrict the fetched fields
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order.push((field.to_string(), OrderDirection::Asc));
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order.push((field.to_string(), OrderDirection::Desc));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: usize) -> Self {
        self.offset = Some(count);
        self
    }

    /// Fill what these options leave unset from `defaults`. Conditions
    /// are merged, explicit ones win.
    pub fn merge(mut self, defaults: &FetchOptions) -> Self {
        for (field, value) in &defaults.conditions {
            if !self.conditions.contains_key(field) {
                self.conditions.insert(field.clone(), value.clone());
            }
        }
        for spec in &defaults.embed {
            if !self.embed.iter().any(|existing| existing.path == spec.path) {
                self.embed.push(spec.clone());
            }
        }
        if self.fields.is_empty() {
            self.fields = defaults.fields.clone();
        }
        if self.order.is_empty() {
            self.order = defaults.order.clone();
        }
        self.limit = self.limit.or(defaults.limit);
        self.offset = self.offset.or(defaults.offset);
        self
    }
}

/// A fetch of one model
#[derive(Debug, Clone)]
pub struct Query {
    schema: Arc<Schema>,
    options: FetchOptions,
}

impl Query {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Every matching entity, with the requested relations loaded
    pub async fn all(&self) -> OrmResult<Collection> {
        let connection = self.schema.connection()?;
        tracing::debug!(
            "Fetching `{}` from `{}` with {} conditions",
            self.schema.name(),
            self.schema.source(),
            self.options.conditions.len()
        );
        let rows = connection.query(self.schema.source(), &self.options).await?;
        let items = rows.into_iter().map(Value::Object).collect();
        let collection = Collection::with_schema(&self.schema, items, CastOptions::loaded())?;
        if !self.options.embed.is_empty() {
            self.schema.embed(&collection.documents(), &self.options.embed).await?;
        }
        Ok(collection)
    }

    /// The first matching entity
    pub async fn first(&self) -> OrmResult<Option<Document>> {
        let query = Query {
            schema: self.schema.clone(),
            options: self.options.clone().limit(1),
        };
        Ok(query.all().await?.documents().into_iter().next())
    }

    /// Number of matching entities
    pub async fn count(&self) -> OrmResult<usize> {
        let connection = self.schema.connection()?;
        connection.count(self.schema.source(), &self.options).await
    }
}

impl Schema {
    /// A query on this model. The default options registered for the
    /// model fill what `options` leaves unset.
    pub fn query(self: &Arc<Self>, options: FetchOptions) -> Query {
        let options = match self.registry().and_then(|registry| registry.query_defaults(self.name())) {
            Some(defaults) => options.merge(&defaults),
            None => options,
        };
        Query {
            schema: self.clone(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builders() {
        let options = FetchOptions::new()
            .where_eq("published", true)
            .where_in("id", vec![1, 2])
            .with("images.tags")
            .order_by_desc("score")
            .limit(10);
        assert_eq!(options.conditions["published"], Value::Bool(true));
        assert_eq!(
            options.conditions["id"],
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(options.embed[0].path, "images.tags");
        assert_eq!(options.order, vec![("score".to_string(), OrderDirection::Desc)]);
        assert_eq!(options.limit, Some(10));
        assert_eq!(OrderDirection::Desc.to_string(), "DESC");
    }

    #[test]
    fn test_merge_keeps_explicit_options() {
        let defaults = FetchOptions::new()
            .where_eq("published", true)
            .where_eq("gallery_id", 1)
            .with("images")
            .limit(50);
        let merged = FetchOptions::new().where_eq("gallery_id", 2).with("cover").merge(&defaults);
        assert_eq!(merged.conditions["gallery_id"], Value::Integer(2));
        assert_eq!(merged.conditions["published"], Value::Bool(true));
        let paths: Vec<&str> = merged.embed.iter().map(|spec| spec.path.as_str()).collect();
        assert_eq!(paths, vec!["cover", "images"]);
        assert_eq!(merged.limit, Some(50));
    }
}
