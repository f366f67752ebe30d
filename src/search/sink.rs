use super::bulk::{BulkAction, BulkResponse};
use crate::error::IndexError;
use std::future::Future;

/// One page of document ids read through a scroll context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollPage {
    pub scroll_id: Option<String>,
    pub ids: Vec<String>,
}

/// Write side of the search engine as the importers see it.
///
/// `ElasticsearchClient` is the production implementation; tests inject an
/// in-memory sink through the same trait.
pub trait DocumentSink: Send + Sync + 'static {
    /// Apply `actions` to `index` in one request.
    fn bulk(
        &self,
        index: &str,
        actions: &[BulkAction],
    ) -> impl Future<Output = Result<BulkResponse, IndexError>> + Send;

    /// Current `index.refresh_interval`, `None` when the engine default applies.
    fn refresh_interval(
        &self,
        index: &str,
    ) -> impl Future<Output = Result<Option<String>, IndexError>> + Send;

    /// Set `index.refresh_interval`; `None` resets it to the engine default.
    fn put_refresh_interval(
        &self,
        index: &str,
        value: Option<&str>,
    ) -> impl Future<Output = Result<(), IndexError>> + Send;

    fn open_scroll(
        &self,
        index: &str,
        batch_size: usize,
    ) -> impl Future<Output = Result<ScrollPage, IndexError>> + Send;

    fn continue_scroll(
        &self,
        scroll_id: &str,
    ) -> impl Future<Output = Result<ScrollPage, IndexError>> + Send;

    fn clear_scroll(&self, scroll_id: &str) -> impl Future<Output = Result<(), IndexError>> + Send;
}
