//! Document representation and the reserved internal properties.
//!
//! Documents are plain BSON documents. User fields are declared by a
//! [`Schema`](crate::schema::Schema); the engine additionally maintains a small
//! set of reserved fields (all prefixed with `_`) that callers cannot set
//! directly.

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// A stored document.
pub type Document = bson::Document;

/// Document identifier.
pub const ID: &str = "_id";
/// Revision number, starting at 1 and incremented by every update.
pub const VERSION: &str = "_version";
/// Creation timestamp (epoch milliseconds).
pub const CREATED_AT: &str = "_createdAt";
/// Client that created the document.
pub const CREATED_BY: &str = "_createdBy";
/// Last modification timestamp (epoch milliseconds).
pub const LAST_MODIFIED_AT: &str = "_lastModifiedAt";
/// Client that last modified the document.
pub const LAST_MODIFIED_BY: &str = "_lastModifiedBy";
/// Ids of the version records captured for the document.
pub const HISTORY: &str = "_history";
/// API version the document was created through.
pub const API_VERSION: &str = "_apiVersion";

/// Every reserved property maintained by the engine.
pub const INTERNAL_PROPERTIES: [&str; 8] = [
    ID,
    VERSION,
    CREATED_AT,
    CREATED_BY,
    LAST_MODIFIED_AT,
    LAST_MODIFIED_BY,
    HISTORY,
    API_VERSION,
];

/// Properties never shown to API consumers unless raw output is requested.
pub const HIDDEN_PROPERTIES: [&str; 2] = [HISTORY, API_VERSION];

/// Returns `true` if `field` is one of the reserved internal properties.
pub fn is_internal(field: &str) -> bool {
    INTERNAL_PROPERTIES.contains(&field)
}

/// Removes the internal properties a caller is not allowed to write.
///
/// The document id is kept so callers can create documents with a known id.
pub fn remove_internal_properties(document: Document) -> Document {
    document
        .into_iter()
        .filter(|(key, _)| key == ID || !is_internal(key))
        .collect()
}

/// Returns the document id as a string, if present.
pub fn document_id(document: &Document) -> Option<String> {
    match document.get(ID)? {
        Bson::String(id) => Some(id.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        other => Some(other.to_string()),
    }
}

/// Returns the current `_version` of a document, `0` when missing.
pub fn document_version(document: &Document) -> i64 {
    match document.get(VERSION) {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

/// Generates a new document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Resolves a dotted path (`address.city`) inside a document.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Converts a JSON value into a document.
///
/// # Errors
///
/// Returns [`ModelError::Serialization`] when the value is not a JSON object.
pub fn from_json(value: Value) -> ModelResult<Document> {
    match serialize_to_bson(&value)? {
        Bson::Document(document) => Ok(document),
        other => Err(ModelError::Serialization(format!(
            "expected a JSON object, found {}",
            other
        ))),
    }
}

/// Converts a document into relaxed extended JSON.
pub fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Serializes any serde value into a document.
pub fn to_document<T: Serialize>(value: &T) -> ModelResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(ModelError::Serialization(format!(
            "expected a document, found {}",
            other
        ))),
    }
}

/// Deserializes a document into any serde value.
pub fn from_document<T: DeserializeOwned>(document: Document) -> ModelResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}
