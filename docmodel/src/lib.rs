//! Schema-driven document models with validation, hooks and revision history.
//!
//! This crate is the entry point of the docmodel project. It re-exports the
//! engine from `docmodel-core` together with the storage backends.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> ModelResult<()> {
//!     let schema = Schema::new()
//!         .field("title", FieldDefinition::new(FieldType::String).required())
//!         .field("publishedAt", FieldDefinition::new(FieldType::DateTime));
//!
//!     let books = Model::builder("books", schema)
//!         .storage(InMemoryStore::new())
//!         .build()?;
//!
//!     books
//!         .create(doc! { "title": "Dune", "publishedAt": "1965-08-01T00:00:00Z" }, Document::new(), CreateOptions::default())
//!         .await?;
//!
//!     let found = books
//!         .find(
//!             r#"{ "publishedAt": { "$lt": "$now" } }"#,
//!             FindOptions::default().query_options(RawQueryOptions::new().sort("title")),
//!         )
//!         .await?;
//!
//!     println!("{} of {} books", found.results.len(), found.metadata.total_count);
//!     Ok(())
//! }
//! ```
//!
//! # Settings
//!
//! A model's behaviour is configured with [`ModelSettings`](settings::ModelSettings),
//! which deserializes from the same JSON a collection definition carries:
//!
//! ```ignore
//! let settings: ModelSettings = serde_json::from_value(json!({
//!     "count": 20,
//!     "sort": "title",
//!     "storeRevisions": true,
//!     "hooks": { "beforeCreate": ["slugify", { "hook": "audit", "options": { "level": 2 } }] },
//!     "index": { "keys": { "slug": 1 }, "options": { "unique": true } }
//! }))?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-process storage for development and testing
//! - [`mongodb`] - MongoDB storage (requires the `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    access, backend, document, error, formatter, history, hook, model, normalize, page, projection, query, registry,
    schema, search, settings, transform, validator,
};

pub use bson;

/// In-memory storage backend.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
