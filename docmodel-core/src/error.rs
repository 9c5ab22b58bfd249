//! Error types and result types for model operations.
//!
//! Every failure the engine can produce is classified into one of the
//! [`ModelError`] variants. The transport layer renders them; this module only
//! guarantees the classification and offers [`ModelError::to_api_error`] as the
//! structured shape the transport is expected to serialize.

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Value};
use thiserror::Error;

/// A single field-level validation fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The offending field name.
    pub field: String,
    /// Machine readable error code, e.g. `ERROR_MAX_LENGTH`.
    pub code: String,
    /// Human readable description.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A single fault found while resolving query options (`page`, `skip`, `count`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterError {
    /// The name of the offending parameter.
    pub parameter: String,
    /// Short title, e.g. "Invalid Skip Parameter Provided".
    pub title: String,
    /// Longer description of the constraint that was violated.
    pub details: String,
}

impl ParameterError {
    pub fn new(parameter: &str, details: impl Into<String>) -> Self {
        let mut title = parameter.to_string();
        if let Some(first) = title.get_mut(0..1) {
            first.make_ascii_uppercase();
        }

        Self {
            parameter: parameter.to_string(),
            title: format!("Invalid {} Parameter Provided", title),
            details: details.into(),
        }
    }
}

/// Failure raised by a lifecycle hook, carrying the hook's own formatted shape.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Hook `{hook}` failed: {message}")]
pub struct HookError {
    /// Name of the hook that failed. Filled in by the chain executor when empty.
    pub hook: String,
    /// Error code supplied by the hook, `API-0002` when the hook did not set one.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Optional structured details supplied by the hook.
    pub details: Option<Value>,
}

impl HookError {
    /// Code used when a hook does not provide one.
    pub const DEFAULT_CODE: &'static str = "API-0002";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            hook: String::new(),
            code: Self::DEFAULT_CODE.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Tags the error with the hook name unless the hook already did.
    pub(crate) fn in_hook(mut self, hook: &str) -> Self {
        if self.hook.is_empty() {
            self.hook = hook.to_string();
        }
        self
    }
}

/// Errors reported by a storage collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The connection to the underlying database is not available.
    #[error("DB_DISCONNECTED")]
    Disconnected,
    /// A unique index rejected the write.
    #[error("E11000 duplicate key error collection: {collection} index: {index}")]
    DuplicateKey {
        collection: String,
        index: String,
    },
    /// The documents could not be converted to or from the storage format.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Any other failure of the storage engine.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for storage collaborators.
pub type StorageResult<T> = Result<T, StorageError>;

/// Represents every failure a model operation can report.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The storage connection is unavailable. Fatal, never retried by the engine.
    #[error("DB_DISCONNECTED")]
    Disconnected,
    /// One or more documents failed schema validation. Nothing was written.
    #[error("Validation Failed")]
    Validation(Vec<FieldError>),
    /// The query used an operator that is never allowed (`$where`).
    #[error("Forbidden query operator `{0}`")]
    ForbiddenOperator(String),
    /// The filter could not be parsed into a query.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// One or more query options were invalid.
    #[error("Invalid query parameters")]
    InvalidParameter(Vec<ParameterError>),
    /// The requested field projection cannot be satisfied together with the ACL projection.
    #[error("Field projection conflict: {0}")]
    FieldConflict(String),
    /// The access control collaborator denied the action.
    #[error("Access to `{action}` on collection `{collection}` is forbidden")]
    Forbidden {
        action: String,
        collection: String,
    },
    /// A lifecycle hook rejected the mutation.
    #[error(transparent)]
    Hook(#[from] HookError),
    /// The storage collaborator failed. Passed through unmodified.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The model definition is invalid (unknown hook, bad settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Structured error object for the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub title: String,
    pub details: Value,
}

impl ModelError {
    /// Stable machine readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            ModelError::Disconnected => "DB_DISCONNECTED",
            ModelError::Validation(_) => "VALIDATION_FAILED",
            ModelError::ForbiddenOperator(_) => "ERROR_FORBIDDEN_OPERATOR",
            ModelError::InvalidFilter(_) => "ERROR_INVALID_FILTER",
            ModelError::InvalidParameter(_) => "ERROR_INVALID_PARAMETER",
            ModelError::FieldConflict(_) => "ERROR_FIELD_CONFLICT",
            ModelError::Forbidden { .. } => "ERROR_FORBIDDEN",
            ModelError::Hook(err) => &err.code,
            ModelError::Storage(StorageError::Disconnected) => "DB_DISCONNECTED",
            ModelError::Storage(StorageError::DuplicateKey { .. }) => "ERROR_DUPLICATE_KEY",
            ModelError::Storage(_) => "ERROR_STORAGE",
            ModelError::Configuration(_) => "ERROR_CONFIGURATION",
            ModelError::Serialization(_) => "ERROR_SERIALIZATION",
        }
    }

    /// Whether the error is a connectivity failure, raised either by the
    /// engine's own check or by the storage collaborator mid-operation.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            ModelError::Disconnected | ModelError::Storage(StorageError::Disconnected)
        )
    }

    /// Maps the error to the structured object rendered by the transport layer.
    pub fn to_api_error(&self) -> ApiError {
        let (status, title, details) = match self {
            ModelError::Validation(errors) => (
                400,
                "Validation Failed".to_string(),
                serde_json::to_value(errors).unwrap_or(Value::Null),
            ),
            ModelError::InvalidParameter(errors) => (
                400,
                "Invalid Parameter".to_string(),
                serde_json::to_value(errors).unwrap_or(Value::Null),
            ),
            ModelError::ForbiddenOperator(_)
            | ModelError::InvalidFilter(_)
            | ModelError::FieldConflict(_) => (400, "Bad Request".to_string(), Value::String(self.to_string())),
            ModelError::Forbidden { .. } => (403, "Forbidden".to_string(), Value::String(self.to_string())),
            ModelError::Hook(err) => (
                400,
                err.message.clone(),
                err.details.clone().unwrap_or_else(|| Value::String(err.hook.clone())),
            ),
            ModelError::Storage(StorageError::DuplicateKey { .. }) => {
                (409, "Conflict".to_string(), Value::String(self.to_string()))
            }
            ModelError::Disconnected | ModelError::Storage(StorageError::Disconnected) => {
                (503, "Service Unavailable".to_string(), Value::String(self.to_string()))
            }
            _ => (500, "Internal Server Error".to_string(), Value::String(self.to_string())),
        };

        ApiError {
            status,
            code: self.code().to_string(),
            title,
            details,
        }
    }
}

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<BsonError> for StorageError {
    fn from(err: BsonError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
