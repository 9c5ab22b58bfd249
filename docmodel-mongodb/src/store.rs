use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions};
use mongodb::{Client, Collection as MongoCollection, IndexModel};
use tracing::{debug, warn};

use docmodel_core::backend::{FindResult, StorageBackend, StorageBackendBuilder, Update};
use docmodel_core::document::ID;
use docmodel_core::error::{StorageError, StorageResult};
use docmodel_core::query::Query;
use docmodel_core::settings::IndexDefinition;

use crate::query::MongoQueryTranslator;
use crate::sanitizer::KeySanitizer;

/// MongoDB storage backend.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize_name(name))
    }

    async fn fetch(&self, filter: Document, options: FindOptions, collection: &str) -> StorageResult<Vec<Document>> {
        let documents = self
            .collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(documents.into_iter().map(KeySanitizer::restore_document).collect())
    }
}

/// Maps driver failures onto the storage error contract.
fn map_error(error: MongoError, collection: &str) -> StorageError {
    if matches!(*error.kind, ErrorKind::ServerSelection { .. }) {
        warn!(collection, error = %error, "database unreachable");
        return StorageError::Disconnected;
    }

    let message = error.to_string();
    if message.contains("E11000") {
        let index = message
            .split("index: ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();

        return StorageError::DuplicateKey {
            collection: collection.to_string(),
            index,
        };
    }

    StorageError::Backend(message)
}

fn update_document(update: &Update) -> Document {
    let mut document = Document::new();
    if !update.set.is_empty() {
        document.insert("$set", KeySanitizer::sanitize_document(update.set.clone()));
    }
    if !update.inc.is_empty() {
        document.insert("$inc", update.inc.clone());
    }
    if !update.push.is_empty() {
        document.insert("$push", update.push.clone());
    }
    document
}

#[async_trait]
impl StorageBackend for MongoDbStore {
    async fn is_connected(&self) -> bool {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> StorageResult<Vec<Document>> {
        if documents.is_empty() {
            return Ok(documents);
        }

        self.collection(collection)
            .insert_many(documents.iter().cloned().map(KeySanitizer::sanitize_document))
            .await
            .map_err(|e| map_error(e, collection))?;

        debug!(collection, count = documents.len(), "inserted documents");

        Ok(documents)
    }

    async fn find(&self, query: &Query, collection: &str) -> StorageResult<FindResult> {
        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;

        let total_count = self
            .collection(collection)
            .count_documents(filter.clone())
            .await
            .map_err(|e| map_error(e, collection))?;

        let mut options = FindOptions::default();
        options.limit = query.limit.map(|limit| limit as i64);
        options.skip = query.offset.map(|skip| skip as u64);
        options.sort = MongoQueryTranslator::sort(&query.sort);
        options.projection = MongoQueryTranslator::projection(&query.fields);

        let results = self.fetch(filter, options, collection).await?;

        Ok(FindResult { results, total_count })
    }

    async fn count(&self, query: &Query, collection: &str) -> StorageResult<u64> {
        self.collection(collection)
            .count_documents(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn update(&self, query: &Query, update: &Update, collection: &str) -> StorageResult<Vec<Document>> {
        if update.is_empty() {
            return Ok(Vec::new());
        }

        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;

        let mut options = FindOptions::default();
        options.projection = Some(doc! { ID: 1 });
        let ids: Vec<Bson> = self
            .fetch(filter.clone(), options, collection)
            .await?
            .into_iter()
            .filter_map(|document| document.get(ID).cloned())
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.collection(collection)
            .update_many(doc! { ID: { "$in": ids.clone() } }, update_document(update))
            .await
            .map_err(|e| map_error(e, collection))?;

        let results = self
            .fetch(doc! { ID: { "$in": ids } }, FindOptions::default(), collection)
            .await?;

        debug!(collection, count = results.len(), "updated documents");

        Ok(results)
    }

    async fn delete(&self, query: &Query, collection: &str) -> StorageResult<u64> {
        let result = self
            .collection(collection)
            .delete_many(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .await
            .map_err(|e| map_error(e, collection))?;

        debug!(collection, deleted = result.deleted_count, "deleted documents");

        Ok(result.deleted_count)
    }

    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> StorageResult<()> {
        self.collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(index.keys.clone())
                    .options(
                        IndexOptions::builder()
                            .name(index.name())
                            .unique(index.options.unique)
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(())
    }

    async fn shutdown(&self) -> StorageResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StorageBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StorageResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(MongoDbStore::new(client, self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_document_omits_empty_operators() {
        let update = Update::set(doc! { "title": "Dune" }).with_inc("_version", 1);

        assert_eq!(
            update_document(&update),
            doc! {
                "$set": { "title": "Dune" },
                "$inc": { "_version": 1_i64 },
            }
        );
    }
}
