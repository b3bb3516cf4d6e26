//! Error types for the mapper
//!
//! Failures are grouped the way callers meet them: configuration mistakes
//! surface while schemas are declared, path errors while documents are
//! walked, relation errors while related data is read or saved, and data
//! errors while values are formatted. Validation failures are not errors;
//! they are reported through `Document::errors()`.

use thiserror::Error;

/// Result type alias for mapper operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for mapper operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    // Configuration errors
    #[error("The relationship `{0}` has no `from` model")]
    MissingFrom(String),

    #[error("The relationship `{0}` has no `to` model")]
    MissingTo(String),

    #[error("Convention for `{0}` doesn't exist")]
    UnknownConvention(String),

    #[error("Unknown relation kind `{0}`")]
    UnknownRelationKind(String),

    #[error("Invalid through relation `{0}`, the `through` option is empty")]
    MissingThrough(String),

    #[error("Invalid through relation `{0}`, the `using` option is empty")]
    MissingUsing(String),

    #[error("Can't bind `{name}`, the name is already used by a {existing}")]
    BindingCollision { name: String, existing: String },

    #[error("Relation `{name}` not found on `{model}`")]
    UnknownRelation { model: String, name: String },

    #[error("Model `{0}` is not registered")]
    UnknownModel(String),

    #[error("The document is not bound to a model schema")]
    Unbound,

    // Path/access errors
    #[error("Field name can't be empty")]
    EmptyFieldName,

    #[error("Invalid path segment `{segment}` in `{path}`, the value is not a document or a collection")]
    InvalidPathSegment { path: String, segment: String },

    #[error("Missing schema field `{field}` on locked schema `{model}`")]
    MissingSchemaField { model: String, field: String },

    #[error("Missing schema definition for field `{field}` on locked schema `{model}`")]
    MissingSchemaDefinition { model: String, field: String },

    // Relation usage errors
    #[error("The relation `{0}` is an external relation, use `fetch()` or `embed()` to load its data")]
    ExternalRelationRequiresFetch(String),

    #[error("The `{key}` key is missing, can't match relation `{relation}`")]
    MissingKeyForMatch { relation: String, key: String },

    #[error("The related entity of `{relation}` has no primary key after saving")]
    MissingRelatedKey { relation: String },

    #[error("Missing primary key on `{0}` entity")]
    MissingPrimaryKey(String),

    // Data errors
    #[error("Invalid date `{0}`")]
    InvalidDate(String),

    #[error("The collection entries are not identity-bearing models")]
    NotAModelCollection,

    #[error("Invalid cast: {0}")]
    InvalidCast(String),

    #[error("Index {index} is out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    // Backend contract errors
    #[error("`{0}` is not implemented by this connection")]
    NotImplemented(String),

    #[error("No `{model}` entity found with id `{id}`")]
    NotFound { model: String, id: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrmError {
    /// True for errors raised while declaring schemas and relations
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrmError::MissingFrom(_)
                | OrmError::MissingTo(_)
                | OrmError::UnknownConvention(_)
                | OrmError::UnknownRelationKind(_)
                | OrmError::MissingThrough(_)
                | OrmError::MissingUsing(_)
                | OrmError::BindingCollision { .. }
                | OrmError::UnknownRelation { .. }
                | OrmError::UnknownModel(_)
        )
    }

    /// True for errors raised while walking a document path
    pub fn is_path(&self) -> bool {
        matches!(
            self,
            OrmError::EmptyFieldName
                | OrmError::InvalidPathSegment { .. }
                | OrmError::MissingSchemaField { .. }
                | OrmError::MissingSchemaDefinition { .. }
        )
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for OrmError {
    fn from(err: serde_yaml::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
