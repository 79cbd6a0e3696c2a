use crate::activity::traits::ActivityManager;
use crate::api::traits::EdflexApi;
use crate::mapper::ContentMapper;
use crate::models::NormalizedContent;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_CONTENT_CHUNK_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentSyncReport {
    pub chunks: usize,
    pub requested: usize,
    pub fetched: usize,
    pub updated: u64,
    pub deleted: u64,
}

/// Refreshes imported activities from upstream, chunk by chunk.
#[derive(Clone)]
pub struct ContentSynchronizer {
    api: Arc<dyn EdflexApi>,
    activities: Arc<dyn ActivityManager>,
    mapper: ContentMapper,
    chunk_size: usize,
}

impl ContentSynchronizer {
    pub fn new(api: Arc<dyn EdflexApi>, activities: Arc<dyn ActivityManager>) -> Self {
        Self {
            api,
            activities,
            mapper: ContentMapper::default(),
            chunk_size: DEFAULT_CONTENT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("content chunk size must be > 0".to_string()));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Refresh every activity last synchronized before `maxlastsync`.
    ///
    /// Chunks are handled one after the other. Ids of a chunk that upstream did not return
    /// are treated as deleted upstream and their activities removed.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn synchronize_all_contents(
        &self,
        maxlastsync: DateTime<Utc>,
        max_records: Option<usize>,
    ) -> Result<ContentSyncReport> {
        let mut chunks = self
            .activities
            .get_outdated_edflex_contentids_in_chunks(maxlastsync, max_records, self.chunk_size)
            .await?;
        let mut report = ContentSyncReport::default();

        while let Some(contentids) = chunks.try_next().await? {
            // Never request more than one chunk's worth of ids at once.
            for ids in contentids.chunks(self.chunk_size) {
                self.sync_chunk(ids, &mut report).await?;
            }
        }

        tracing::info!(
            chunks = report.chunks,
            requested = report.requested,
            fetched = report.fetched,
            updated = report.updated,
            deleted = report.deleted,
            "content synchronization finished"
        );
        Ok(report)
    }

    async fn sync_chunk(
        &self,
        contentids: &[String],
        report: &mut ContentSyncReport,
    ) -> Result<()> {
        if contentids.is_empty() {
            return Ok(());
        }
        report.chunks += 1;
        report.requested += contentids.len();

        let fetched: Vec<(String, serde_json::Value)> = self
            .api
            .get_contents_by_ids(contentids)
            .await?
            .try_collect()
            .await?;
        report.fetched += fetched.len();

        let mut returned: HashSet<String> = HashSet::with_capacity(fetched.len());
        let contents: Vec<NormalizedContent> = self
            .mapper
            .map_contents(fetched)
            .into_iter()
            .map(|(id, mut content)| {
                if content.edflexid.is_none() {
                    content.edflexid = Some(id.clone());
                }
                returned.insert(id);
                content
            })
            .collect();

        report.updated += self
            .activities
            .update_imported_activities_from_contents(&contents)
            .await?;

        let deleted: Vec<String> = contentids
            .iter()
            .filter(|id| !returned.contains(*id))
            .cloned()
            .collect();
        if !deleted.is_empty() {
            tracing::info!(count = deleted.len(), "contents removed upstream");
            report.deleted += self.activities.delete_scorms_by_contentids(&deleted).await?;
        }

        tracing::debug!(
            chunk_len = contentids.len(),
            fetched = contents.len(),
            deleted = deleted.len(),
            "content chunk synchronized"
        );
        Ok(())
    }
}
