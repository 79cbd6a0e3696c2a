#![cfg(test)]

use crate::activity::{ActivityManager, ContentIdChunks};
use crate::api::models::{ApiCatalog, CatalogList, CategoriesPage, CategoryFilter, RawContent};
use crate::api::traits::{ContentStream, EdflexApi};
use crate::models::{CatalogId, NormalizedContent};
use crate::storage::connect_pool;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub async fn memory_pool() -> SqlitePool {
    connect_pool("sqlite::memory:").await.unwrap()
}

/// How the fake answers the connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Reachable,
    Unreachable,
    TransportError,
}

/// In-memory upstream API.
pub struct FakeEdflexApi {
    pub catalogs: Vec<String>,
    /// `(catalog, page) -> page`; missing pages come back empty.
    pub pages: BTreeMap<(String, u32), CategoriesPage>,
    pub contents: BTreeMap<String, RawContent>,
    pub failing_pages: HashSet<(String, u32)>,
    pub probe: Probe,
    pub category_requests: Mutex<Vec<(String, u32, u32)>>,
    pub content_requests: Mutex<Vec<Vec<String>>>,
    pub probes: AtomicUsize,
}

impl Default for FakeEdflexApi {
    fn default() -> Self {
        Self {
            catalogs: Vec::new(),
            pages: BTreeMap::new(),
            contents: BTreeMap::new(),
            failing_pages: HashSet::new(),
            probe: Probe::Reachable,
            category_requests: Mutex::new(Vec::new()),
            content_requests: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }
}

impl FakeEdflexApi {
    pub fn with_page(mut self, catalog: &str, page: u32, data: CategoriesPage) -> Self {
        if !self.catalogs.iter().any(|c| c == catalog) {
            self.catalogs.push(catalog.to_string());
        }
        self.pages.insert((catalog.to_string(), page), data);
        self
    }

    pub fn with_content(mut self, id: &str, raw: RawContent) -> Self {
        self.contents.insert(id.to_string(), raw);
        self
    }
}

#[async_trait]
impl EdflexApi for FakeEdflexApi {
    async fn get_catalogs(&self) -> Result<CatalogList> {
        Ok(CatalogList {
            data: self
                .catalogs
                .iter()
                .map(|id| ApiCatalog {
                    id: id.clone(),
                    attributes: serde_json::Value::Null,
                })
                .collect(),
        })
    }

    async fn get_categories(
        &self,
        catalog_id: &CatalogId,
        _filter: CategoryFilter,
        page: u32,
        per_page: u32,
    ) -> Result<CategoriesPage> {
        self.category_requests
            .lock()
            .unwrap()
            .push((catalog_id.to_string(), page, per_page));
        let key = (catalog_id.to_string(), page);
        if self.failing_pages.contains(&key) {
            return Err(Error::BackendMessage(format!(
                "categories page {page} of {catalog_id} unavailable"
            )));
        }
        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }

    async fn get_contents_by_ids(&self, ids: &[String]) -> Result<ContentStream> {
        self.content_requests.lock().unwrap().push(ids.to_vec());
        let found: Vec<Result<(String, RawContent)>> = ids
            .iter()
            .filter_map(|id| self.contents.get(id).map(|raw| Ok((id.clone(), raw.clone()))))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(found)))
    }

    async fn can_connect_to_the_api(&self) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.probe {
            Probe::Reachable => Ok(true),
            Probe::Unreachable => Ok(false),
            Probe::TransportError => Err(Error::BackendMessage("connection refused".to_string())),
        }
    }
}

/// Activity manager that serves fixed chunks and records every call.
#[derive(Default)]
pub struct RecordingActivityManager {
    pub chunks: Vec<Vec<String>>,
    pub chunk_requests: Mutex<Vec<(DateTime<Utc>, Option<usize>, usize)>>,
    pub updates: Mutex<Vec<Vec<NormalizedContent>>>,
    pub deletions: Mutex<Vec<Vec<String>>>,
}

impl RecordingActivityManager {
    pub fn with_chunks(chunks: Vec<Vec<&str>>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| c.into_iter().map(str::to_string).collect())
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ActivityManager for RecordingActivityManager {
    async fn get_outdated_edflex_contentids_in_chunks(
        &self,
        maxlastsync: DateTime<Utc>,
        max_records: Option<usize>,
        chunk_size: usize,
    ) -> Result<ContentIdChunks> {
        self.chunk_requests
            .lock()
            .unwrap()
            .push((maxlastsync, max_records, chunk_size));
        let chunks: Vec<Result<Vec<String>>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn update_imported_activities_from_contents(
        &self,
        contents: &[NormalizedContent],
    ) -> Result<u64> {
        self.updates.lock().unwrap().push(contents.to_vec());
        Ok(contents.len() as u64)
    }

    async fn delete_scorms_by_contentids(&self, contentids: &[String]) -> Result<u64> {
        self.deletions.lock().unwrap().push(contentids.to_vec());
        Ok(contentids.len() as u64)
    }
}
