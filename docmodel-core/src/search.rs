//! Search indexing contract.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::warn;

use crate::document::Document;
use crate::error::ModelResult;

/// Receives persisted documents for indexing.
///
/// Indexing never blocks a mutation. Failures are logged and dropped.
#[async_trait]
pub trait SearchIndexer: Send + Sync + Debug {
    async fn index(&self, collection: &str, documents: Vec<Document>) -> ModelResult<()>;
}

/// Indexer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchIndexer;

#[async_trait]
impl SearchIndexer for NoopSearchIndexer {
    async fn index(&self, _collection: &str, _documents: Vec<Document>) -> ModelResult<()> {
        Ok(())
    }
}

/// Builds the task that hands documents to the indexer.
///
/// Nothing is built for an empty batch.
pub(crate) fn index_task(
    indexer: Arc<dyn SearchIndexer>,
    collection: String,
    documents: Vec<Document>,
) -> Option<BoxFuture<'static, ()>> {
    if documents.is_empty() {
        return None;
    }

    Some(
        async move {
            if let Err(err) = indexer.index(&collection, documents).await {
                warn!(collection = %collection, error = %err, "search indexing failed");
            }
        }
        .boxed(),
    )
}
