//! Storage collaborator abstraction.
//!
//! The engine never talks to a database directly. Everything it persists or
//! reads goes through a [`StorageBackend`], which executes normalized
//! [`Query`] values against named collections.
//!
//! # Contract
//!
//! - Connectivity loss is reported as [`StorageError::Disconnected`], never as
//!   an empty result.
//! - Unique index violations are reported as [`StorageError::DuplicateKey`].
//! - `insert` returns the documents as stored, `update` the documents after
//!   the update was applied.
//!
//! # Traits
//!
//! - [`StorageBackend`]: the collaborator itself
//! - [`StorageBackendBuilder`]: factory for backends that need async setup

use std::fmt::Debug;

use async_trait::async_trait;
use bson::Bson;

use crate::document::{Document, get_path};
use crate::error::StorageResult;
use crate::query::Query;
use crate::settings::IndexDefinition;

/// Field level modifications applied by [`StorageBackend::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Fields replaced with new values (`$set`).
    pub set: Document,
    /// Numeric fields incremented by the given amount (`$inc`).
    pub inc: Document,
    /// Values appended to array fields (`$push`).
    pub push: Document,
}

impl Update {
    pub fn set(set: Document) -> Self {
        Update {
            set,
            ..Update::default()
        }
    }

    pub fn with_inc(mut self, field: impl Into<String>, by: i64) -> Self {
        self.inc.insert(field.into(), by);
        self
    }

    pub fn with_push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.push.is_empty()
    }

    /// Applies the modifications to a document in place.
    ///
    /// Backends without native update operators use this to stay
    /// consistent with the MongoDB semantics.
    pub fn apply_to(&self, document: &mut Document) {
        for (field, value) in &self.set {
            document.insert(field.clone(), value.clone());
        }

        for (field, by) in &self.inc {
            let current = get_path(document, field).cloned().unwrap_or(Bson::Int32(0));
            document.insert(field.clone(), add(&current, by));
        }

        for (field, value) in &self.push {
            match document.get_mut(field) {
                Some(Bson::Array(items)) => items.push(value.clone()),
                _ => {
                    document.insert(field.clone(), Bson::Array(vec![value.clone()]));
                }
            }
        }
    }
}

fn add(current: &Bson, by: &Bson) -> Bson {
    match (current, by) {
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b)),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a) + b),
        (a, b) => Bson::Int64(as_i64(a) + as_i64(b)),
    }
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(v) => *v as i64,
        Bson::Int64(v) => *v,
        Bson::Double(v) => *v as i64,
        _ => 0,
    }
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(v) => *v as f64,
        Bson::Int64(v) => *v as f64,
        Bson::Double(v) => *v,
        _ => 0.0,
    }
}

/// A page of documents together with the number of documents matching the
/// filter before pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResult {
    pub results: Vec<Document>,
    pub total_count: u64,
}

/// Abstract interface of the storage collaborator.
///
/// Implementations must be thread-safe; the engine shares one backend
/// between every model and request.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Whether the underlying connection is currently usable.
    async fn is_connected(&self) -> bool;

    /// Inserts documents and returns them as stored.
    async fn insert(&self, documents: Vec<Document>, collection: &str) -> StorageResult<Vec<Document>>;

    /// Finds documents, applying filter, sort, offset, limit and projection.
    async fn find(&self, query: &Query, collection: &str) -> StorageResult<FindResult>;

    /// Counts documents matching the filter of `query`.
    async fn count(&self, query: &Query, collection: &str) -> StorageResult<u64> {
        Ok(self.find(&query.unbounded(), collection).await?.total_count)
    }

    /// Applies `update` to every document matching `query` and returns the
    /// updated documents.
    async fn update(&self, query: &Query, update: &Update, collection: &str) -> StorageResult<Vec<Document>>;

    /// Deletes every document matching `query` and returns how many were removed.
    async fn delete(&self, query: &Query, collection: &str) -> StorageResult<u64>;

    /// Creates an index. Creating an existing index is a no-op.
    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> StorageResult<()>;

    /// Releases the resources held by the backend.
    async fn shutdown(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Factory for backends requiring async initialization.
#[async_trait]
pub trait StorageBackendBuilder {
    type Backend: StorageBackend;

    async fn build(self) -> StorageResult<Self::Backend>;
}
