//! Response metadata for paginated reads.

use serde::{Deserialize, Serialize};

use crate::normalize::QueryOptions;

/// Pagination metadata returned next to a page of results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub limit: usize,
    pub page: usize,
    /// Number of documents skipped before this page.
    pub offset: usize,
    pub total_count: u64,
    pub total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<usize>,
}

impl Metadata {
    pub fn new(options: &QueryOptions, total_count: u64) -> Self {
        let limit = options.limit.max(1) as u64;
        let total_pages = total_count.div_ceil(limit);
        let page = options.page;

        Metadata {
            limit: options.limit,
            page,
            offset: options.skip,
            total_count,
            total_pages,
            next_page: ((page as u64) < total_pages).then_some(page + 1),
            prev_page: (page > 1).then(|| page - 1),
        }
    }
}
