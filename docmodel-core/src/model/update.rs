use bson::DateTime;
use tracing::debug;

use super::{Model, UpdateOptions, UpdateResponse};
use crate::access::AccessAction;
use crate::backend::Update;
use crate::document::{Document, HISTORY, ID, LAST_MODIFIED_AT, LAST_MODIFIED_BY, VERSION, is_internal};
use crate::error::{ModelError, ModelResult};
use crate::hook::HookType;
use crate::normalize::{FilterInput, compile};
use crate::query::Query;
use crate::search::index_task;
use crate::transform::FieldHook;
use crate::validator::ValidationMode;

impl Model {
    /// Applies `update` to every document matching `query`.
    ///
    /// The update payload is validated partially, transformed and passed
    /// through the `beforeUpdate` hooks once. When history is enabled the
    /// current body of every matched document is captured before anything is
    /// written; a failed capture aborts the update. Each matched document
    /// then has the payload set, its `_version` incremented and, with history,
    /// the id of its snapshot appended to `_history`.
    pub async fn update(
        &self,
        query: impl Into<FilterInput>,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateResponse> {
        self.ensure_connected().await?;

        let filter = self.normalizer().filter(query.into())?;
        let permitted = self.authorize(AccessAction::Update, options.client.as_ref()).await?;

        let mut update: Document = if options.remove_internal_properties {
            update.into_iter().filter(|(key, _)| !is_internal(key)).collect()
        } else {
            update
        };
        update.remove(ID);

        if options.validate {
            self.validator(&permitted)
                .validate_documents(std::slice::from_ref(&update), ValidationMode::Update)
                .map_err(ModelError::Validation)?;
        }

        update.insert(LAST_MODIFIED_AT, DateTime::now().timestamp_millis());
        if let Some(client) = &options.client {
            update.insert(LAST_MODIFIED_BY, client.client_id.clone());
        }
        update.extend(options.internals.clone());

        let update = self.transforms.apply(update, FieldHook::BeforeSave, &self.name, &self.schema).await?;

        let ctx = self
            .hook_context(HookType::BeforeUpdate, &options.request)
            .with_query(filter.clone());
        let update = self.chain(HookType::BeforeUpdate).run(update, &ctx).await?;

        let matched = self
            .storage
            .find(
                &Query {
                    filter: compile(&filter)?,
                    ..Query::default()
                },
                &self.name,
            )
            .await?
            .results;

        if matched.is_empty() {
            debug!(collection = %self.name, "update matched no documents");
            return Ok(UpdateResponse { results: Vec::new() });
        }

        let versions = match &self.history {
            Some(history) => history.capture_versions(self.storage.as_ref(), &matched).await?,
            None => Vec::new(),
        };

        let mut results = Vec::with_capacity(matched.len());
        for (index, document) in matched.iter().enumerate() {
            let Some(id) = document.get(ID).cloned() else {
                continue;
            };

            let mut modification = Update::set(update.clone()).with_inc(VERSION, 1);
            if let Some(version) = versions.get(index) {
                modification = modification.with_push(HISTORY, version.id.clone());
            }

            results.extend(self.storage.update(&Query::by_id(id), &modification, &self.name).await?);
        }

        debug!(collection = %self.name, count = results.len(), "documents updated");

        self.detach(index_task(self.search.clone(), self.name.clone(), results.clone()))
            .await;
        self.detach(self.chain(HookType::AfterUpdate).best_effort(
            results.clone(),
            self.hook_context(HookType::AfterUpdate, &options.request)
                .with_query(filter)
                .with_update(update),
        ))
        .await;

        let results = self.transform_all(results, FieldHook::AfterSave).await?;
        let results = self.format(results, options.raw_output, options.compose).await?;

        Ok(UpdateResponse { results })
    }
}
