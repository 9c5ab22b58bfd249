//! Re-exports of the types most applications need.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use bson::{Bson, doc};

pub use docmodel_core::{
    access::{AccessAction, AccessControl, AccessDecision, AccessRequest, AllowAll, Client},
    backend::{FindResult, StorageBackend, StorageBackendBuilder, Update},
    document::Document,
    error::{ApiError, FieldError, HookError, ModelError, ModelResult, StorageError, StorageResult},
    formatter::{DefaultOutputFormatter, FormatOptions, OutputFormatter},
    history::VersionRecord,
    hook::{Hook, HookContext, HookRegistry, HookType, RequestContext},
    model::{
        CountResponse, CreateOptions, CreateResponse, DeleteOptions, DeleteResponse, FindOptions, FindResponse, Model,
        ModelBuilder, UpdateOptions, UpdateResponse,
    },
    normalize::{FilterInput, QueryOptions, RawQueryOptions},
    page::Metadata,
    projection::Projection,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    registry::ModelRegistry,
    schema::{FieldDefinition, FieldType, Schema},
    search::SearchIndexer,
    settings::{HookConfig, HookSettings, IndexDefinition, ModelSettings},
    spawn::{Spawner, TokioSpawner},
    transform::{FieldTransform, TransformContext},
};
