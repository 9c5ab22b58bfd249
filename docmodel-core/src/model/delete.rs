use bson::Bson;
use tracing::debug;

use super::{DeleteOptions, DeleteResponse, Model};
use crate::access::AccessAction;
use crate::document::ID;
use crate::error::ModelResult;
use crate::hook::HookType;
use crate::normalize::{FilterInput, compile};
use crate::query::Query;

impl Model {
    /// Deletes every document matching `query`.
    ///
    /// `beforeDelete` hooks see each matched document and may veto the whole
    /// deletion. `afterDelete` hooks run detached once the documents are gone.
    pub async fn delete(&self, query: impl Into<FilterInput>, options: DeleteOptions) -> ModelResult<DeleteResponse> {
        self.ensure_connected().await?;

        let filter = self.normalizer().filter(query.into())?;
        self.authorize(AccessAction::Delete, options.client.as_ref()).await?;

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
            return Ok(DeleteResponse { deleted_count: 0 });
        }

        let ctx = self
            .hook_context(HookType::BeforeDelete, &options.request)
            .with_query(filter.clone());
        self.chain(HookType::BeforeDelete).run_batch(matched.clone(), &ctx).await?;

        let ids: Vec<Bson> = matched.iter().filter_map(|document| document.get(ID).cloned()).collect();
        let deleted_count = self.storage.delete(&Query::by_ids(ids), &self.name).await?;

        debug!(collection = %self.name, deleted_count, "documents deleted");

        self.detach(self.chain(HookType::AfterDelete).best_effort(
            matched,
            self.hook_context(HookType::AfterDelete, &options.request)
                .with_query(filter),
        ))
        .await;

        Ok(DeleteResponse { deleted_count })
    }
}
