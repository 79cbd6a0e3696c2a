//! Production wiring of the job collaborators.

use async_trait::async_trait;
use edflex_core::activity::{ActivityManager, SqliteActivityManager};
use edflex_core::api::traits::EdflexApi;
use edflex_core::config::EdflexConfig;
use edflex_core::jobs::{SyncComponents, SynchronizeCategoriesJob, SynchronizeContentsJob};
use edflex_core::storage::{connect_pool, CategoryStore, SqliteCategoryStore};
use edflex_core::Result;
use edflex_integrations::EdflexApiClient;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Builds a fresh API client per job and storage handles over one shared SQLite pool.
pub struct AppComponents {
    config: EdflexConfig,
    pool: OnceCell<SqlitePool>,
}

impl AppComponents {
    pub fn new(config: EdflexConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &EdflexConfig {
        &self.config
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .get_or_try_init(|| connect_pool(&self.config.database_url))
            .await
            .cloned()
    }

    pub async fn sqlite_category_store(&self) -> Result<SqliteCategoryStore> {
        SqliteCategoryStore::new(self.pool().await?).await
    }

    pub async fn sqlite_activity_manager(&self) -> Result<SqliteActivityManager> {
        SqliteActivityManager::new(self.pool().await?).await
    }

    pub fn categories_job(self: &Arc<Self>) -> SynchronizeCategoriesJob {
        SynchronizeCategoriesJob::new(self.clone()).with_page_size(self.config.category_page_size)
    }

    pub fn contents_job(self: &Arc<Self>) -> SynchronizeContentsJob {
        SynchronizeContentsJob::new(self.clone())
            .with_chunk_size(self.config.content_chunk_size)
            .with_staleness(self.config.content_staleness)
    }
}

#[async_trait]
impl SyncComponents for AppComponents {
    async fn api_client(&self) -> Result<Arc<dyn EdflexApi>> {
        Ok(Arc::new(EdflexApiClient::from_config(&self.config)?))
    }

    async fn category_store(&self) -> Result<Arc<dyn CategoryStore>> {
        Ok(Arc::new(self.sqlite_category_store().await?))
    }

    async fn activity_manager(&self) -> Result<Arc<dyn ActivityManager>> {
        Ok(Arc::new(self.sqlite_activity_manager().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use edflex_core::models::NormalizedContent;
    use std::collections::HashMap;

    fn config() -> EdflexConfig {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EDFLEX_API_URL", "https://api.edflex.test"),
            ("EDFLEX_CLIENT_ID", "id"),
            ("EDFLEX_CLIENT_SECRET", "secret"),
            ("EDFLEX_DATABASE_URL", "sqlite::memory:"),
            ("EDFLEX_CATEGORY_PAGE_SIZE", "8"),
        ]);
        EdflexConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn storage_shares_one_database() {
        let components = AppComponents::new(config());
        let activities = components.sqlite_activity_manager().await.unwrap();
        activities
            .import_activity(
                &NormalizedContent {
                    edflexid: Some("c1".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        // A second handle sees rows written through the first one.
        let again = components.sqlite_activity_manager().await.unwrap();
        assert_eq!(again.list_activities().await.unwrap().len(), 1);

        let store = components.category_store().await.unwrap();
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn builds_api_client_from_config() {
        let components = AppComponents::new(config());
        assert!(components.api_client().await.is_ok());
    }
}
