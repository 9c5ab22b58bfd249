//! Access control contract.
//!
//! Evaluating ACL rules is the host application's job. The engine only
//! consumes the outcome: whether the action is allowed and which fields the
//! client may see or write.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::projection::Projection;

/// Identity of the client performing a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub client_id: String,
    #[serde(default)]
    pub access_type: Option<String>,
}

impl Client {
    pub fn new(client_id: impl Into<String>) -> Self {
        Client {
            client_id: client_id.into(),
            access_type: None,
        }
    }

    pub fn admin(client_id: impl Into<String>) -> Self {
        Client {
            client_id: client_id.into(),
            access_type: Some("admin".to_string()),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.access_type.as_deref() == Some("admin")
    }
}

/// Action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Create,
    Read,
    Update,
    Delete,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Create => "create",
            AccessAction::Read => "read",
            AccessAction::Update => "update",
            AccessAction::Delete => "delete",
        }
    }
}

/// Input of an access check.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub client: Option<&'a Client>,
    pub action: AccessAction,
    pub collection: &'a str,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    /// Fields visible to the client. Empty means every field.
    #[serde(default)]
    pub fields: Projection,
}

impl AccessDecision {
    pub fn allow() -> Self {
        AccessDecision {
            allowed: true,
            fields: Projection::new(),
        }
    }

    pub fn allow_fields(fields: Projection) -> Self {
        AccessDecision { allowed: true, fields }
    }

    pub fn deny() -> Self {
        AccessDecision {
            allowed: false,
            fields: Projection::new(),
        }
    }

    /// Converts a denial into [`ModelError::Forbidden`].
    pub fn into_result(self, request: &AccessRequest<'_>) -> ModelResult<Projection> {
        if self.allowed {
            Ok(self.fields)
        } else {
            Err(ModelError::Forbidden {
                action: request.action.as_str().to_string(),
                collection: request.collection.to_string(),
            })
        }
    }
}

/// Decides whether a client may perform an action on a collection.
#[async_trait]
pub trait AccessControl: Send + Sync + Debug {
    async fn validate_access(&self, request: AccessRequest<'_>) -> ModelResult<AccessDecision>;
}

/// Grants every action on every field.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn validate_access(&self, _request: AccessRequest<'_>) -> ModelResult<AccessDecision> {
        Ok(AccessDecision::allow())
    }
}
