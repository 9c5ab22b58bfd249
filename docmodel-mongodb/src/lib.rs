//! MongoDB storage backend for docmodel.
//!
//! Enable it through the `mongodb` feature of the facade crate:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! Filters are translated back into native MongoDB syntax, so queries run on
//! the server. Duplicate key failures surface as
//! [`StorageError::DuplicateKey`](docmodel_core::error::StorageError::DuplicateKey)
//! and an unreachable server as
//! [`StorageError::Disconnected`](docmodel_core::error::StorageError::Disconnected).
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::StorageBackendBuilder, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017", "library")
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

mod query;
mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
