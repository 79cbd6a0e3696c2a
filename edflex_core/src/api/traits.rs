use crate::api::models::{CatalogList, CategoriesPage, CategoryFilter, RawContent};
use crate::models::CatalogId;
use crate::Result;
use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;

/// Lazily produced `(content id, raw content)` pairs.
///
/// IDs the upstream no longer knows about are simply absent from the stream.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<(String, RawContent)>> + Send + 'static>>;

/// The upstream catalog API, as far as synchronization needs it.
#[async_trait]
pub trait EdflexApi: Send + Sync {
    async fn get_catalogs(&self) -> Result<CatalogList>;

    /// One page (1-based) of categories of a catalog.
    async fn get_categories(
        &self,
        catalog_id: &CatalogId,
        filter: CategoryFilter,
        page: u32,
        per_page: u32,
    ) -> Result<CategoriesPage>;

    /// Full content records for exactly the given ids.
    async fn get_contents_by_ids(&self, ids: &[String]) -> Result<ContentStream>;

    /// Lightweight capability probe. May fail on transport errors.
    async fn can_connect_to_the_api(&self) -> Result<bool>;
}
