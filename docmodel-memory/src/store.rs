//! In-memory storage backend.
//!
//! Documents are kept per collection in insertion order behind async-aware
//! read-write locks. Queries scan the whole collection, which is fine for
//! tests and small datasets.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use bson::Bson;
use mea::rwlock::RwLock;
use tracing::debug;

use docmodel_core::backend::{FindResult, StorageBackend, StorageBackendBuilder, Update};
use docmodel_core::document::{Document, ID, get_path};
use docmodel_core::error::{StorageError, StorageResult};
use docmodel_core::query::{Query, SortDirection};
use docmodel_core::settings::IndexDefinition;

use crate::evaluator::{Comparable, DocumentEvaluator, PatternCache};

type CollectionMap = HashMap<String, Vec<Document>>;
type IndexMap = HashMap<String, Vec<IndexDefinition>>;

/// Thread-safe in-memory storage backend.
///
/// Clones share the same underlying data, so one store can back several
/// models at once.
///
/// Unique indexes are enforced on insert and update. They are sparse:
/// documents missing every indexed field are not checked.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// let model = Model::builder("books", schema).storage(store.clone()).build()?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    collections: Arc<RwLock<CollectionMap>>,
    indexes: Arc<RwLock<IndexMap>>,
    connected: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(CollectionMap::new())),
            indexes: Arc::new(RwLock::new(IndexMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Simulates a lost connection. Every operation fails with
    /// [`StorageError::Disconnected`] until [`InMemoryStore::connect`] is called.
    pub fn disconnect(&self) {
        self.connected.store(false, AtomicOrdering::SeqCst);
    }

    pub fn connect(&self) {
        self.connected.store(true, AtomicOrdering::SeqCst);
    }

    /// Returns every document of a collection, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check_connected(&self) -> StorageResult<()> {
        if self.connected.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Disconnected)
        }
    }

    fn matches(document: &Document, query: &Query, patterns: &mut PatternCache) -> StorageResult<bool> {
        match &query.filter {
            Some(filter) => DocumentEvaluator::new(document, patterns).evaluate(filter),
            None => Ok(true),
        }
    }
}

/// Checks `candidate` against the unique indexes of a collection.
///
/// `existing` are the stored documents the candidate may collide with.
fn check_unique<'a>(
    collection: &str,
    indexes: &[IndexDefinition],
    existing: impl Iterator<Item = &'a Document> + Clone,
    candidate: &Document,
) -> StorageResult<()> {
    for index in indexes.iter().filter(|index| index.options.unique) {
        let key = index_key(index, candidate);
        if key.iter().all(Option::is_none) {
            continue;
        }

        if existing.clone().any(|document| index_key(index, document) == key) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                index: index.name(),
            });
        }
    }

    Ok(())
}

fn index_key<'a>(index: &IndexDefinition, document: &'a Document) -> Vec<Option<&'a Bson>> {
    index
        .keys
        .keys()
        .map(|field| get_path(document, field))
        .collect()
}

fn sort_documents(documents: &mut [Document], query: &Query) {
    if query.sort.is_empty() {
        return;
    }

    documents.sort_by(|a, b| {
        for sort in &query.sort {
            let left = get_path(a, &sort.field).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = get_path(b, &sort.field).map(Comparable::from).unwrap_or(Comparable::Null);

            let ordering = match sort.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl StorageBackend for InMemoryStore {
    async fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> StorageResult<Vec<Document>> {
        self.check_connected()?;

        let indexes = self.indexes.read().await.get(collection).cloned().unwrap_or_default();
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();

        // Validate the whole batch before writing any of it.
        for (position, document) in documents.iter().enumerate() {
            if let Some(id) = document.get(ID) {
                let taken = stored
                    .iter()
                    .chain(&documents[..position])
                    .any(|other| other.get(ID) == Some(id));
                if taken {
                    return Err(StorageError::DuplicateKey {
                        collection: collection.to_string(),
                        index: "_id_".to_string(),
                    });
                }
            }
            check_unique(collection, &indexes, stored.iter().chain(&documents[..position]), document)?;
        }

        stored.extend(documents.iter().cloned());
        debug!(collection, count = documents.len(), "inserted documents");

        Ok(documents)
    }

    async fn find(&self, query: &Query, collection: &str) -> StorageResult<FindResult> {
        self.check_connected()?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(FindResult::default());
        };

        let mut matched = match &query.filter {
            Some(filter) => DocumentEvaluator::filter_documents(stored.iter(), filter)?,
            None => stored.clone(),
        };
        let total_count = matched.len() as u64;

        sort_documents(&mut matched, query);

        let results = matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| query.fields.apply(document))
            .collect();

        Ok(FindResult { results, total_count })
    }

    async fn count(&self, query: &Query, collection: &str) -> StorageResult<u64> {
        self.check_connected()?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(0);
        };

        let mut patterns = PatternCache::default();
        let mut count = 0;
        for document in stored {
            if Self::matches(document, query, &mut patterns)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update(&self, query: &Query, update: &Update, collection: &str) -> StorageResult<Vec<Document>> {
        self.check_connected()?;

        let indexes = self.indexes.read().await.get(collection).cloned().unwrap_or_default();
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let mut patterns = PatternCache::default();
        let mut changed = Vec::new();
        for (position, document) in stored.iter().enumerate() {
            if Self::matches(document, query, &mut patterns)? {
                let mut modified = document.clone();
                update.apply_to(&mut modified);
                changed.push((position, modified));
            }
        }

        for (position, modified) in &changed {
            let others = stored
                .iter()
                .enumerate()
                .filter(|(other, _)| other != position)
                .map(|(_, document)| document);
            check_unique(collection, &indexes, others, modified)?;
        }

        let mut results = Vec::with_capacity(changed.len());
        for (position, modified) in changed {
            stored[position] = modified.clone();
            results.push(modified);
        }

        debug!(collection, count = results.len(), "updated documents");

        Ok(results)
    }

    async fn delete(&self, query: &Query, collection: &str) -> StorageResult<u64> {
        self.check_connected()?;

        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut patterns = PatternCache::default();
        let mut matched = Vec::with_capacity(stored.len());
        for document in stored.iter() {
            matched.push(Self::matches(document, query, &mut patterns)?);
        }
        let deleted = matched.iter().filter(|m| **m).count() as u64;

        let mut matched = matched.into_iter();
        stored.retain(|_| !matched.next().unwrap_or(false));

        debug!(collection, deleted, "deleted documents");

        Ok(deleted)
    }

    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> StorageResult<()> {
        self.check_connected()?;

        let mut indexes = self.indexes.write().await;
        let defined = indexes.entry(collection.to_string()).or_default();
        if !defined.iter().any(|existing| existing.keys == index.keys) {
            defined.push(index.clone());
        }

        Ok(())
    }
}

/// Builder for [`InMemoryStore`].
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    indexes: Vec<(String, IndexDefinition)>,
}

impl InMemoryStoreBuilder {
    /// Declares an index up front.
    pub fn index(mut self, collection: impl Into<String>, index: IndexDefinition) -> Self {
        self.indexes.push((collection.into(), index));
        self
    }
}

#[async_trait]
impl StorageBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> StorageResult<Self::Backend> {
        let store = InMemoryStore::new();
        for (collection, index) in &self.indexes {
            store.create_index(collection, index).await?;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::projection::Projection;
    use docmodel_core::query::Filter;
    use pretty_assertions::assert_eq;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert(
                vec![
                    doc! { "_id": "a", "title": "Dune", "pages": 412 },
                    doc! { "_id": "b", "title": "Emma", "pages": 320 },
                    doc! { "_id": "c", "title": "Ulysses", "pages": 730 },
                ],
                "books",
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn find_sorts_paginates_and_counts() {
        let store = seeded().await;
        let query = Query::builder()
            .sort("pages", SortDirection::Desc)
            .limit(2)
            .offset(1)
            .build();

        let found = store.find(&query, "books").await.unwrap();

        assert_eq!(found.total_count, 3);
        let ids: Vec<_> = found.results.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn find_applies_projection() {
        let store = seeded().await;
        let query = Query::builder()
            .filter(Filter::eq("_id", "a"))
            .fields(Projection::include(["title"]))
            .build();

        let found = store.find(&query, "books").await.unwrap();

        assert_eq!(found.results, vec![doc! { "_id": "a", "title": "Dune" }]);
    }

    #[tokio::test]
    async fn update_applies_modifications() {
        let store = seeded().await;
        let update = Update::set(doc! { "title": "Dune Messiah" })
            .with_inc("_version", 1)
            .with_push("_history", "v1");

        let updated = store.update(&Query::by_id("a"), &update, "books").await.unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].get_str("title").unwrap(), "Dune Messiah");
        assert_eq!(updated[0].get("_version"), Some(&Bson::Int64(1)));
        assert_eq!(updated[0].get_array("_history").unwrap(), &vec![Bson::from("v1")]);
    }

    #[tokio::test]
    async fn delete_reports_the_number_removed() {
        let store = seeded().await;

        let deleted = store.delete(&Query::by_ids(["a", "c"]), "books").await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.documents("books").await.len(), 1);
    }

    #[tokio::test]
    async fn unique_indexes_reject_duplicates() {
        let store = seeded().await;
        store
            .create_index("books", &IndexDefinition::new(doc! { "title": 1 }).unique())
            .await
            .unwrap();

        let err = store
            .insert(vec![doc! { "_id": "d", "title": "Emma" }], "books")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::DuplicateKey {
                collection: "books".to_string(),
                index: "title_1".to_string(),
            }
        );

        // Sparse: documents without the field never collide.
        store.insert(vec![doc! { "_id": "e" }, doc! { "_id": "f" }], "books").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = seeded().await;

        let err = store.insert(vec![doc! { "_id": "a" }], "books").await.unwrap_err();

        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert_eq!(store.documents("books").await.len(), 3);
    }

    #[tokio::test]
    async fn disconnected_store_fails_every_operation() {
        let store = seeded().await;
        store.disconnect();

        assert!(!store.is_connected().await);
        assert_eq!(store.find(&Query::new(), "books").await.unwrap_err(), StorageError::Disconnected);
        assert_eq!(store.count(&Query::new(), "books").await.unwrap_err(), StorageError::Disconnected);

        store.connect();
        assert_eq!(store.count(&Query::new(), "books").await.unwrap(), 3);
    }
}
