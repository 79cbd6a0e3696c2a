//! Reconciliation of local state against the upstream catalog.

pub mod categories;
pub mod contents;

pub use categories::{CatalogSyncReport, CategorySynchronizer, DEFAULT_CATEGORY_PAGE_SIZE};
pub use contents::{ContentSyncReport, ContentSynchronizer, DEFAULT_CONTENT_CHUNK_SIZE};
