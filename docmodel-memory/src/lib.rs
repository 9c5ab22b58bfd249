//! In-memory storage backend for docmodel.
//!
//! [`InMemoryStore`] implements [`docmodel_core::backend::StorageBackend`]
//! entirely in process. It understands every filter operator of the query
//! language, multi-key sorting, projections and unique indexes, and it can
//! simulate a lost connection, which makes it the backend of choice for tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel::memory::InMemoryStore;
//!
//! let store = InMemoryStore::builder()
//!     .index("users", IndexDefinition::new(doc! { "email": 1 }).unique())
//!     .build()
//!     .await?;
//!
//! let users = Model::builder("users", schema).storage(store).build()?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
