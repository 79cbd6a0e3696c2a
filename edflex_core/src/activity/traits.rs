use crate::models::NormalizedContent;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use std::pin::Pin;

/// Finite, pull-driven sequence of content id batches.
///
/// A batch is only read from storage when the consumer polls for it, so writes made while
/// handling one batch are visible to the query producing the next.
pub type ContentIdChunks = Pin<Box<dyn Stream<Item = Result<Vec<String>>> + Send + 'static>>;

/// Owner of imported activities.
#[async_trait]
pub trait ActivityManager: Send + Sync {
    /// Upstream ids of activities last synchronized before `maxlastsync`, in batches of at
    /// most `chunk_size`. `max_records` caps the total number of ids across all batches.
    async fn get_outdated_edflex_contentids_in_chunks(
        &self,
        maxlastsync: DateTime<Utc>,
        max_records: Option<usize>,
        chunk_size: usize,
    ) -> Result<ContentIdChunks>;

    /// Refresh every activity whose content id matches one of `contents`. Returns the
    /// number of activities updated.
    async fn update_imported_activities_from_contents(
        &self,
        contents: &[NormalizedContent],
    ) -> Result<u64>;

    /// Remove activities whose content no longer exists upstream. Returns the count.
    async fn delete_scorms_by_contentids(&self, contentids: &[String]) -> Result<u64>;
}
