//! Schema-driven document models over pluggable storage.
//!
//! This crate is the core of the docmodel project. A [`Model`](model::Model)
//! binds a collection to a [`Schema`](schema::Schema) and runs every request
//! through the same pipeline:
//!
//! - **Query normalization** ([`normalize`]) - raw filters and query-string options become a [`Query`](query::Query)
//! - **Field projections** ([`projection`]) - requested fields merged with the fields a client may see
//! - **Validation** ([`validator`]) - documents checked against the schema before they are written
//! - **Field transforms** ([`transform`]) - per-field conversions before and after persistence
//! - **Hooks** ([`hook`]) - named, ordered lifecycle callbacks around create, update and delete
//! - **Revision history** ([`history`]) - snapshots of every document before it is updated
//! - **Output formatting** ([`formatter`]) - bookkeeping fields hidden, dates rendered
//!
//! Storage, access control and search indexing are collaborators behind the
//! [`backend`], [`access`] and [`search`] traits.
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::model::{CreateOptions, Model};
//! use docmodel_core::schema::{FieldDefinition, FieldType, Schema};
//!
//! let schema = Schema::new()
//!     .field("title", FieldDefinition::new(FieldType::String).required())
//!     .field("pages", FieldDefinition::new(FieldType::Number));
//!
//! let books = Model::builder("books", schema).storage(store).build()?;
//! let created = books
//!     .create(doc! { "title": "Dune", "pages": 412 }, Document::new(), CreateOptions::default())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod access;
pub mod backend;
pub mod document;
pub mod error;
pub mod formatter;
pub mod history;
pub mod hook;
pub mod model;
pub mod normalize;
pub mod page;
pub mod projection;
pub mod query;
pub mod registry;
pub mod schema;
pub mod search;
pub mod settings;
pub mod spawn;
pub mod transform;
pub mod validator;
