//! # docweave-orm: schema-driven object-document mapper
//!
//! Binds plain nested data to typed, change-tracked documents and
//! collections, enforces a declared schema (column types, defaults,
//! relations), and eager loads related entities across foreign-key and
//! pivot relations with one fetch per relation.
//!
//! Schemas are registered on a [`Registry`], which resolves models by name
//! and provides the default [`Connection`]. Documents are cheap handles on
//! a shared graph: the same node may be held by several parents and a
//! change through one of them is visible through all.

pub mod collection;
pub mod config;
pub mod connection;
pub mod conventions;
pub mod document;
pub mod error;
pub mod fake;
pub mod graph;
pub mod model;
pub mod path;
pub mod query;
pub mod registry;
pub mod relationships;
pub mod schema;
pub mod through;
pub mod validator;
pub mod value;
pub mod watch;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by the recursive steps of embedding, saving and
/// validation
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use collection::{Collection, Cursor};
pub use config::OrmConfig;
pub use connection::Connection;
pub use conventions::Conventions;
pub use document::{Document, ExportOptions, ModifiedOptions};
pub use error::{OrmError, OrmResult};
pub use graph::{Node, NodeId, Parents};
pub use model::ValidateOptions;
pub use query::{EmbedSpec, FetchOptions, OrderDirection, Query};
pub use registry::Registry;
pub use relationships::{Link, RelationKind, RelationSpec, Relationship};
pub use schema::{CastOptions, Column, Embed, SaveOptions, Schema};
pub use through::Through;
pub use validator::{ValidationOutcome, Validator};
pub use value::{Map, Value};
pub use watch::{flush, pending, tick};
