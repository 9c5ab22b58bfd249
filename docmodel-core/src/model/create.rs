use bson::{Bson, DateTime, doc};
use tracing::debug;

use super::{CreateOptions, CreateResponse, DocumentBatch, Model, api_version};
use crate::access::AccessAction;
use crate::document::{
    API_VERSION, CREATED_AT, CREATED_BY, Document, HISTORY, ID, VERSION, new_id, remove_internal_properties,
};
use crate::error::{ModelError, ModelResult};
use crate::hook::HookType;
use crate::search::index_task;
use crate::transform::FieldHook;
use crate::validator::ValidationMode;

impl Model {
    /// Creates one or more documents.
    ///
    /// `internals` are merged into every document after validation, which is
    /// how callers set properties such as `_createdBy` themselves.
    ///
    /// The batch is all-or-nothing up to persistence: a validation fault in
    /// any document, or a failing `beforeCreate` hook for any document,
    /// rejects the whole batch. `afterCreate` hooks and search indexing run
    /// detached and never fail the request.
    pub async fn create(
        &self,
        documents: impl Into<DocumentBatch>,
        internals: Document,
        options: CreateOptions,
    ) -> ModelResult<CreateResponse> {
        self.ensure_connected().await?;

        let DocumentBatch(documents) = documents.into();
        debug!(collection = %self.name, count = documents.len(), "creating documents");

        let documents: Vec<Document> = documents
            .into_iter()
            .map(|document| {
                let mut document = if options.remove_internal_properties {
                    remove_internal_properties(document)
                } else {
                    document
                };
                self.apply_defaults(&mut document);
                document
            })
            .collect();

        let permitted = self.authorize(AccessAction::Create, options.client.as_ref()).await?;
        if options.validate {
            self.validator(&permitted)
                .validate_documents(&documents, ValidationMode::Create)
                .map_err(ModelError::Validation)?;
        }

        let created_at = DateTime::now().timestamp_millis();
        let api_version = api_version(&options.request);
        let documents: Vec<Document> = documents
            .into_iter()
            .map(|mut document| {
                document.insert(CREATED_AT, created_at);
                if let Some(client) = &options.client {
                    document.insert(CREATED_BY, client.client_id.clone());
                }
                if let Some(version) = &api_version {
                    document.insert(API_VERSION, version.clone());
                }
                document.extend(internals.clone());

                // `_id` leads, the way MongoDB stores it.
                let id = document.remove(ID).unwrap_or_else(|| Bson::String(new_id()));
                let mut stored = doc! { ID: id };
                stored.extend(document);

                stored.insert(VERSION, 1_i64);
                if self.history.is_some() {
                    stored.insert(HISTORY, Bson::Array(Vec::new()));
                }
                stored
            })
            .collect();

        let documents = self.transform_all(documents, FieldHook::BeforeSave).await?;

        let ctx = self.hook_context(HookType::BeforeCreate, &options.request);
        let documents = self.chain(HookType::BeforeCreate).run_batch(documents, &ctx).await?;

        let results = self.storage.insert(documents, &self.name).await?;
        debug!(collection = %self.name, count = results.len(), "documents created");

        self.detach(index_task(self.search.clone(), self.name.clone(), results.clone()))
            .await;
        self.detach(
            self.chain(HookType::AfterCreate)
                .best_effort(results.clone(), self.hook_context(HookType::AfterCreate, &options.request)),
        )
        .await;

        let results = self.transform_all(results, FieldHook::AfterSave).await?;
        let results = self.format(results, options.raw_output, options.compose).await?;

        Ok(CreateResponse { results })
    }
}
