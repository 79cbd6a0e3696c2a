use crate::api::traits::EdflexApi;
use crate::jobs::traits::{JobOutcome, SyncComponents, SyncJob};
use crate::jobs::{failed, skip_if_unreachable};
use crate::models::SyncKind;
use crate::sync::{ContentSynchronizer, DEFAULT_CONTENT_CHUNK_SIZE};
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Activities last synchronized longer ago than this are refreshed.
pub const DEFAULT_STALENESS_HOURS: i64 = 22;

struct Parts {
    api: Arc<dyn EdflexApi>,
    synchronizer: ContentSynchronizer,
}

/// Refreshes imported activities whose content is older than the staleness threshold.
pub struct SynchronizeContentsJob {
    components: Arc<dyn SyncComponents>,
    staleness: Duration,
    max_records: Option<usize>,
    chunk_size: usize,
    parts: OnceCell<Parts>,
}

impl SynchronizeContentsJob {
    pub fn new(components: Arc<dyn SyncComponents>) -> Self {
        Self {
            components,
            staleness: Duration::hours(DEFAULT_STALENESS_HOURS),
            max_records: None,
            chunk_size: DEFAULT_CONTENT_CHUNK_SIZE,
            parts: OnceCell::new(),
        }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    async fn parts(&self) -> Result<&Parts> {
        self.parts
            .get_or_try_init(|| async {
                let api = self.components.api_client().await?;
                let activities = self.components.activity_manager().await?;
                let synchronizer = ContentSynchronizer::new(api.clone(), activities)
                    .with_chunk_size(self.chunk_size)?;
                Ok(Parts { api, synchronizer })
            })
            .await
    }
}

#[async_trait]
impl SyncJob for SynchronizeContentsJob {
    fn kind(&self) -> SyncKind {
        SyncKind::Contents
    }

    fn name(&self) -> &'static str {
        "synchronize_contents"
    }

    #[tracing::instrument(level = "info", skip(self), fields(job = self.name()))]
    async fn execute(&self) -> JobOutcome {
        let parts = match self.parts().await {
            Ok(parts) => parts,
            Err(e) => return failed(self.kind(), &e),
        };
        if let Some(skipped) = skip_if_unreachable(parts.api.as_ref(), self.kind()).await {
            return skipped;
        }

        let maxlastsync = Utc::now() - self.staleness;
        match parts
            .synchronizer
            .synchronize_all_contents(maxlastsync, self.max_records)
            .await
        {
            Ok(report) => JobOutcome::Completed {
                summary: serde_json::to_value(report).unwrap_or_default(),
            },
            Err(e) => failed(self.kind(), &e),
        }
    }
}
