use tracing::debug;

use super::{CountResponse, FindOptions, FindResponse, Model};
use crate::access::AccessAction;
use crate::document::Document;
use crate::error::ModelResult;
use crate::normalize::{FilterInput, QueryOptions, QueryValidation, validate_query};
use crate::page::Metadata;
use crate::query::Query;

impl Model {
    /// Finds documents matching `query`.
    ///
    /// Pagination, sorting and projection come from the raw query options.
    /// The requested projection is narrowed to the fields the client may
    /// read, and the model's default filters are always applied.
    pub async fn find(&self, query: impl Into<FilterInput>, options: FindOptions) -> ModelResult<FindResponse> {
        self.ensure_connected().await?;

        let (query, query_options) = self.prepare(query.into(), &options).await?;
        let found = self.storage.find(&query, &self.name).await?;
        debug!(collection = %self.name, count = found.results.len(), total = found.total_count, "found documents");

        let metadata = Metadata::new(&query_options, found.total_count);
        let results = self
            .format(found.results, options.raw_output, query_options.compose)
            .await?;

        Ok(FindResponse { results, metadata })
    }

    /// Counts documents matching `query`.
    pub async fn count(&self, query: impl Into<FilterInput>, options: FindOptions) -> ModelResult<CountResponse> {
        self.ensure_connected().await?;

        let (query, query_options) = self.prepare(query.into(), &options).await?;
        let total = self.storage.count(&query, &self.name).await?;

        Ok(CountResponse {
            metadata: Metadata::new(&query_options, total),
        })
    }

    /// Checks a filter for forbidden operators.
    pub fn validate_query(&self, query: &Document) -> QueryValidation {
        validate_query(query)
    }

    async fn prepare(&self, filter: FilterInput, options: &FindOptions) -> ModelResult<(Query, QueryOptions)> {
        let acl_fields = self.authorize(AccessAction::Read, options.client.as_ref()).await?;
        self.normalizer().normalize(filter, &options.query_options, &acl_fields)
    }
}
