//! The schema-bound handle through which every operation on one collection
//! is performed.
//!
//! A [`Model`] ties together a [`Schema`], its [`ModelSettings`] and the
//! collaborators the engine relies on:
//!
//! - a [`StorageBackend`] that persists documents,
//! - an [`AccessControl`] implementation deciding what a client may do,
//! - a [`SearchIndexer`] fed with every persisted document,
//! - an [`OutputFormatter`] rendering documents for API consumers,
//! - optionally a [`Spawner`] for work that outlives the request.
//!
//! Hooks and field transforms are resolved when the model is built, so an
//! unknown hook name is reported by [`ModelBuilder::build`], not at request
//! time.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let model = Model::builder("books", schema)
//!     .storage(InMemoryStore::new())
//!     .build()?;
//!
//! let created = model
//!     .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
//!     .await?;
//! ```

mod create;
mod delete;
mod find;
mod update;

use std::collections::HashMap;
use std::sync::Arc;

use bson::Bson;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::access::{AccessAction, AccessControl, AccessRequest, AllowAll, Client};
use crate::backend::StorageBackend;
use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use crate::formatter::{DefaultOutputFormatter, FormatOptions, OutputFormatter};
use crate::history::{History, VersionRecord};
use crate::hook::{HookChain, HookContext, HookRegistry, HookType, RequestContext};
use crate::normalize::{Normalizer, RawQueryOptions};
use crate::page::Metadata;
use crate::projection::Projection;
use crate::schema::Schema;
use crate::search::{NoopSearchIndexer, SearchIndexer};
use crate::spawn::{Spawner, detach};
use crate::settings::ModelSettings;
use crate::transform::{FieldHook, FieldTransform, FieldTransforms};
use crate::validator::{Patterns, Validator};

/// One or more documents submitted in a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentBatch(pub Vec<Document>);

impl From<Document> for DocumentBatch {
    fn from(document: Document) -> Self {
        DocumentBatch(vec![document])
    }
}

impl From<Vec<Document>> for DocumentBatch {
    fn from(documents: Vec<Document>) -> Self {
        DocumentBatch(documents)
    }
}

/// Options of [`Model::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub client: Option<Client>,
    pub compose: Option<bool>,
    /// Return documents as stored, skipping the output formatter.
    pub raw_output: bool,
    /// Strip caller supplied internal properties (except `_id`).
    pub remove_internal_properties: bool,
    pub request: Option<Arc<RequestContext>>,
    pub validate: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            client: None,
            compose: None,
            raw_output: false,
            remove_internal_properties: true,
            request: None,
            validate: true,
        }
    }
}

impl CreateOptions {
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn raw_output(mut self) -> Self {
        self.raw_output = true;
        self
    }

    pub fn request(mut self, request: RequestContext) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn keep_internal_properties(mut self) -> Self {
        self.remove_internal_properties = false;
        self
    }
}

/// Options of [`Model::update`].
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub client: Option<Client>,
    pub compose: Option<bool>,
    /// Internal properties merged into the update, e.g. `_lastModifiedBy`.
    pub internals: Document,
    pub raw_output: bool,
    pub remove_internal_properties: bool,
    pub request: Option<Arc<RequestContext>>,
    pub validate: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            client: None,
            compose: None,
            internals: Document::new(),
            raw_output: false,
            remove_internal_properties: true,
            request: None,
            validate: true,
        }
    }
}

impl UpdateOptions {
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn internals(mut self, internals: Document) -> Self {
        self.internals = internals;
        self
    }

    pub fn raw_output(mut self) -> Self {
        self.raw_output = true;
        self
    }

    pub fn request(mut self, request: RequestContext) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

/// Options of [`Model::delete`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub client: Option<Client>,
    pub request: Option<Arc<RequestContext>>,
}

impl DeleteOptions {
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn request(mut self, request: RequestContext) -> Self {
        self.request = Some(Arc::new(request));
        self
    }
}

/// Options of [`Model::find`] and [`Model::count`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub client: Option<Client>,
    pub query_options: RawQueryOptions,
    pub raw_output: bool,
}

impl FindOptions {
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn query_options(mut self, options: RawQueryOptions) -> Self {
        self.query_options = options;
        self
    }

    pub fn raw_output(mut self) -> Self {
        self.raw_output = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub results: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub results: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    pub results: Vec<Document>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountResponse {
    pub metadata: Metadata,
}

/// A collection bound to its schema, settings and collaborators.
#[derive(Debug)]
pub struct Model {
    name: String,
    schema: Arc<Schema>,
    settings: ModelSettings,
    storage: Arc<dyn StorageBackend>,
    access: Arc<dyn AccessControl>,
    search: Arc<dyn SearchIndexer>,
    formatter: Arc<dyn OutputFormatter>,
    transforms: FieldTransforms,
    patterns: Patterns,
    hooks: HashMap<HookType, Arc<HookChain>>,
    history: Option<History>,
    spawner: Option<Arc<dyn Spawner>>,
}

impl Model {
    pub fn builder(name: impl Into<String>, schema: Schema) -> ModelBuilder {
        ModelBuilder::new(name, schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    /// Creates the indexes declared in the model settings.
    pub async fn create_indexes(&self) -> ModelResult<()> {
        for index in self.settings.index.iter() {
            self.storage.create_index(&self.name, index).await?;
        }
        Ok(())
    }

    /// Lists the captured versions of a document, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] when history is disabled.
    pub async fn get_versions(&self, document_id: &str) -> ModelResult<Vec<VersionRecord>> {
        self.require_history()?
            .get_versions(self.storage.as_ref(), document_id)
            .await
    }

    /// Fetches one captured version of a document.
    pub async fn get_version(&self, document_id: &str, version_id: &str) -> ModelResult<Option<VersionRecord>> {
        self.require_history()?
            .get_version(self.storage.as_ref(), document_id, version_id)
            .await
    }

    fn require_history(&self) -> ModelResult<&History> {
        self.history
            .as_ref()
            .ok_or_else(|| ModelError::Configuration(format!("history is disabled for `{}`", self.name)))
    }

    async fn ensure_connected(&self) -> ModelResult<()> {
        if self.storage.is_connected().await {
            Ok(())
        } else {
            Err(ModelError::Disconnected)
        }
    }

    /// Returns the fields the client may access for `action`.
    async fn authorize(&self, action: AccessAction, client: Option<&Client>) -> ModelResult<Projection> {
        let request = AccessRequest {
            client,
            action,
            collection: &self.name,
        };
        self.access.validate_access(request).await?.into_result(&request)
    }

    fn normalizer(&self) -> Normalizer<'_> {
        Normalizer::new(&self.schema, &self.settings)
    }

    fn validator<'a>(&'a self, permitted: &'a Projection) -> Validator<'a> {
        Validator::new(&self.schema, &self.patterns, permitted).closed(self.settings.is_closed())
    }

    fn chain(&self, hook_type: HookType) -> Arc<HookChain> {
        self.hooks
            .get(&hook_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(HookChain::empty(hook_type)))
    }

    async fn detach(&self, task: Option<BoxFuture<'static, ()>>) {
        detach(self.spawner.as_deref(), task).await
    }

    fn hook_context(&self, hook_type: HookType, request: &Option<Arc<RequestContext>>) -> HookContext {
        HookContext::new(hook_type, Arc::clone(&self.schema), self.name.clone()).with_request(request.clone())
    }

    fn apply_defaults(&self, document: &mut Document) {
        for (name, definition) in self.schema.iter() {
            if let Some(default) = &definition.default {
                if !document.contains_key(name) {
                    document.insert(name, default.clone());
                }
            }
        }
    }

    async fn transform_all(&self, documents: Vec<Document>, point: FieldHook) -> ModelResult<Vec<Document>> {
        if self.transforms.is_empty() {
            return Ok(documents);
        }

        futures::future::join_all(
            documents
                .into_iter()
                .map(|document| self.transforms.apply(document, point, &self.name, &self.schema)),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn format(&self, results: Vec<Document>, raw_output: bool, compose: Option<bool>) -> ModelResult<Vec<Document>> {
        if raw_output {
            return Ok(results);
        }

        let options = FormatOptions {
            compose: compose.or(self.settings.compose),
        };
        self.formatter.format_for_output(results, &self.schema, options).await
    }
}

fn api_version(request: &Option<Arc<RequestContext>>) -> Option<Bson> {
    request
        .as_ref()
        .and_then(|r| r.api_version.clone())
        .map(Bson::String)
}

/// Builder for [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    schema: Schema,
    settings: ModelSettings,
    storage: Option<Arc<dyn StorageBackend>>,
    access: Arc<dyn AccessControl>,
    search: Arc<dyn SearchIndexer>,
    formatter: Arc<dyn OutputFormatter>,
    hooks: HookRegistry,
    field_transforms: HashMap<String, Arc<dyn FieldTransform>>,
    spawner: Option<Arc<dyn Spawner>>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        ModelBuilder {
            name: name.into(),
            schema,
            settings: ModelSettings::default(),
            storage: None,
            access: Arc::new(AllowAll),
            search: Arc::new(NoopSearchIndexer),
            formatter: Arc::new(DefaultOutputFormatter),
            hooks: HookRegistry::new(),
            field_transforms: HashMap::new(),
            spawner: None,
        }
    }

    pub fn settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn storage(self, storage: impl StorageBackend + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    /// Uses a backend shared with other models.
    pub fn shared_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn access(mut self, access: impl AccessControl + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchIndexer>) -> Self {
        self.search = search;
        self
    }

    pub fn formatter(mut self, formatter: impl OutputFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Registry the configured hook names are resolved against.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Runs `after*` hooks and search indexing through `spawner`.
    ///
    /// Defaults to the ambient tokio runtime, or to awaiting the work in
    /// place when there is none.
    pub fn spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Replaces the built-in transform of `field`.
    pub fn field_transform(mut self, field: impl Into<String>, transform: impl FieldTransform + 'static) -> Self {
        self.field_transforms.insert(field.into(), Arc::new(transform));
        self
    }

    /// Resolves hooks and transforms and builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] when no storage backend was given
    /// or a configured hook is not registered. Validation patterns that do not
    /// compile are reported the same way.
    pub fn build(self) -> ModelResult<Model> {
        let storage = self
            .storage
            .ok_or_else(|| ModelError::Configuration(format!("model `{}` has no storage backend", self.name)))?;

        let hooks = HookType::ALL
            .iter()
            .map(|hook_type| {
                let chain = self.hooks.chain(*hook_type, self.settings.hooks.get(*hook_type))?;
                Ok((*hook_type, Arc::new(chain)))
            })
            .collect::<ModelResult<HashMap<_, _>>>()?;
        let patterns = Patterns::compile(&self.schema)?;

        let history = self
            .settings
            .history_enabled()
            .then(|| History::new(self.settings.history_collection(&self.name)));

        Ok(Model {
            transforms: FieldTransforms::from_schema(&self.schema, &self.field_transforms),
            patterns,
            schema: Arc::new(self.schema),
            name: self.name,
            settings: self.settings,
            storage,
            access: self.access,
            search: self.search,
            formatter: self.formatter,
            hooks,
            history,
            spawner: self.spawner,
        })
    }
}
