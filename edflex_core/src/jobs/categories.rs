use crate::api::traits::EdflexApi;
use crate::jobs::traits::{JobOutcome, SyncComponents, SyncJob};
use crate::jobs::{failed, skip_if_unreachable};
use crate::models::SyncKind;
use crate::sync::{CategorySynchronizer, DEFAULT_CATEGORY_PAGE_SIZE};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

struct Parts {
    api: Arc<dyn EdflexApi>,
    synchronizer: CategorySynchronizer,
}

/// Mirrors upstream categories into local storage.
pub struct SynchronizeCategoriesJob {
    components: Arc<dyn SyncComponents>,
    page_size: u32,
    parts: OnceCell<Parts>,
}

impl SynchronizeCategoriesJob {
    pub fn new(components: Arc<dyn SyncComponents>) -> Self {
        Self {
            components,
            page_size: DEFAULT_CATEGORY_PAGE_SIZE,
            parts: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    async fn parts(&self) -> Result<&Parts> {
        self.parts
            .get_or_try_init(|| async {
                let api = self.components.api_client().await?;
                let store = self.components.category_store().await?;
                let synchronizer =
                    CategorySynchronizer::new(api.clone(), store).with_page_size(self.page_size)?;
                Ok(Parts { api, synchronizer })
            })
            .await
    }
}

#[async_trait]
impl SyncJob for SynchronizeCategoriesJob {
    fn kind(&self) -> SyncKind {
        SyncKind::Categories
    }

    fn name(&self) -> &'static str {
        "synchronize_categories"
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

        match parts.synchronizer.synchronize_all_catalogs().await {
            Ok(report) => JobOutcome::Completed {
                summary: serde_json::to_value(report).unwrap_or_default(),
            },
            Err(e) => failed(self.kind(), &e),
        }
    }
}
