//! Revision history.
//!
//! When history is enabled, the pre-update body of every document touched by
//! an update is stored as a [`VersionRecord`] in a sibling collection
//! (`<model>Versions` by default). Capture happens strictly before the update
//! is persisted: if capture fails, the update is not applied.
//!
//! Capture and update are two separate storage calls. Whether they are atomic
//! together is up to the storage collaborator.

use bson::{DateTime, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::document::{Document, ID, document_id, document_version, new_id};
use crate::error::{ModelError, ModelResult};
use crate::query::{Filter, Query, SortDirection};

const DOCUMENT: &str = "_document";
const CAPTURED_AT: &str = "_capturedAt";

/// Snapshot of a document as it was before one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Id of the record itself.
    #[serde(rename = "_id")]
    pub id: String,
    /// Id of the document the snapshot belongs to.
    #[serde(rename = "_document")]
    pub document_id: String,
    /// `_version` of the document at capture time.
    #[serde(rename = "_version")]
    pub version: i64,
    #[serde(rename = "_capturedAt")]
    pub captured_at: DateTime,
    /// The complete document body at capture time.
    pub body: Document,
}

impl VersionRecord {
    /// Snapshots `document`.
    ///
    /// # Errors
    ///
    /// Fails when the document has no `_id`.
    pub fn capture(document: &Document) -> ModelResult<Self> {
        let document_id = document_id(document).ok_or_else(|| {
            ModelError::Serialization("cannot capture a version of a document without an id".to_string())
        })?;

        Ok(VersionRecord {
            id: new_id(),
            document_id,
            version: document_version(document),
            captured_at: DateTime::now(),
            body: document.clone(),
        })
    }

    fn to_document(&self) -> Document {
        doc! {
            ID: self.id.clone(),
            DOCUMENT: self.document_id.clone(),
            "_version": self.version,
            CAPTURED_AT: self.captured_at,
            "body": self.body.clone(),
        }
    }

    fn from_document(document: Document) -> ModelResult<Self> {
        crate::document::from_document(document)
    }
}

/// History of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    collection: String,
}

impl History {
    pub fn new(collection: impl Into<String>) -> Self {
        History {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stores a snapshot of every document and returns the records in input order.
    pub async fn capture_versions(
        &self,
        storage: &dyn StorageBackend,
        documents: &[Document],
    ) -> ModelResult<Vec<VersionRecord>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let records = documents
            .iter()
            .map(VersionRecord::capture)
            .collect::<ModelResult<Vec<_>>>()?;

        storage
            .insert(records.iter().map(VersionRecord::to_document).collect(), &self.collection)
            .await?;

        debug!(collection = %self.collection, count = records.len(), "captured versions");

        Ok(records)
    }

    /// Lists the versions of a document, oldest first.
    pub async fn get_versions(&self, storage: &dyn StorageBackend, document_id: &str) -> ModelResult<Vec<VersionRecord>> {
        let query = Query::builder()
            .filter(Filter::eq(DOCUMENT, document_id))
            .sort(CAPTURED_AT, SortDirection::Asc)
            .sort("_version", SortDirection::Asc)
            .build();

        storage
            .find(&query, &self.collection)
            .await?
            .results
            .into_iter()
            .map(VersionRecord::from_document)
            .collect()
    }

    /// Fetches one version record by its id.
    pub async fn get_version(
        &self,
        storage: &dyn StorageBackend,
        document_id: &str,
        version_id: &str,
    ) -> ModelResult<Option<VersionRecord>> {
        let query = Query::builder()
            .filter(Filter::and([Filter::eq(DOCUMENT, document_id), Filter::eq(ID, version_id)]))
            .limit(1)
            .build();

        storage
            .find(&query, &self.collection)
            .await?
            .results
            .into_iter()
            .next()
            .map(VersionRecord::from_document)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captures_id_and_version() {
        let record = VersionRecord::capture(&doc! { "_id": "a", "_version": 3, "title": "Dune" }).unwrap();

        assert_eq!(record.document_id, "a");
        assert_eq!(record.version, 3);
        assert_eq!(record.body.get_str("title").unwrap(), "Dune");
    }

    #[test]
    fn refuses_documents_without_id() {
        assert!(VersionRecord::capture(&doc! { "title": "Dune" }).is_err());
    }

    #[test]
    fn stored_shape_round_trips() {
        let record = VersionRecord::capture(&doc! { "_id": "a", "_version": 1 }).unwrap();
        let stored = record.to_document();

        assert_eq!(stored.get_str("_document").unwrap(), "a");
        assert_eq!(VersionRecord::from_document(stored).unwrap(), record);
    }
}
