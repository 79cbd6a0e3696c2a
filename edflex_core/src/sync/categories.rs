use crate::api::models::{ApiCategory, CategoryFilter};
use crate::api::traits::EdflexApi;
use crate::models::{
    from_unix_seconds, to_unix_seconds, CatalogId, Category, CategoryTranslation, NewCategory,
    NewCategoryTranslation,
};
use crate::storage::traits::{CategoryStore, CategoryTransaction};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_CATEGORY_PAGE_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryChanges {
    pub inserted: u64,
    pub updated: u64,
    pub touched: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TranslationChanges {
    pub inserted: u64,
    pub updated: u64,
}

/// Outcome of one full pass over every catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSyncReport {
    pub catalogs: usize,
    pub pages: usize,
    /// Pages whose local writes were rolled back.
    pub failed_pages: usize,
    pub categories: usize,
    pub stale_deleted: u64,
    pub orphans_deleted: u64,
}

impl CatalogSyncReport {
    /// A pass is complete when every page was stored.
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0
    }
}

/// Mirrors the upstream top-level category tree into the local store.
#[derive(Clone)]
pub struct CategorySynchronizer {
    api: Arc<dyn EdflexApi>,
    store: Arc<dyn CategoryStore>,
    per_page: u32,
}

impl CategorySynchronizer {
    pub fn new(api: Arc<dyn EdflexApi>, store: Arc<dyn CategoryStore>) -> Self {
        Self {
            api,
            store,
            per_page: DEFAULT_CATEGORY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, per_page: u32) -> Result<Self> {
        if per_page == 0 {
            return Err(Error::InvalidInput("category page size must be > 0".to_string()));
        }
        self.per_page = per_page;
        Ok(self)
    }

    /// Reconcile every catalog, then drop categories not seen during this pass and purge
    /// orphaned translations.
    ///
    /// A page whose local writes fail is logged and skipped; the pass carries on with the
    /// next page. Stale deletion only runs when every page was stored. Upstream fetch errors
    /// abort the pass.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn synchronize_all_catalogs(&self) -> Result<CatalogSyncReport> {
        let started = now_seconds()?;
        let catalogs = self.api.get_catalogs().await?;
        let mut report = CatalogSyncReport::default();

        for catalog in catalogs.data {
            let catalog_id = match CatalogId::new(catalog.id) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping catalog without id");
                    continue;
                }
            };
            report.catalogs += 1;

            let mut page = 1u32;
            loop {
                let response = self
                    .api
                    .get_categories(&catalog_id, CategoryFilter::top_level(), page, self.per_page)
                    .await?;
                report.pages += 1;
                report.categories += response.data.len();

                if let Err(e) = self.sync_page(&response.data, &catalog_id).await {
                    report.failed_pages += 1;
                    tracing::error!(
                        catalog_id = %catalog_id,
                        page,
                        error = %e,
                        "category page synchronization failed"
                    );
                }

                if !response.links.next || response.data.is_empty() {
                    break;
                }
                page += 1;
            }
        }

        if report.is_complete() {
            report.stale_deleted = self.store.delete_categories_synced_before(started).await?;
        } else {
            tracing::warn!(
                failed_pages = report.failed_pages,
                "category pass incomplete; keeping categories not seen in this pass"
            );
        }

        report.orphans_deleted = self.delete_orphaned_edflex_category_translations().await?;

        tracing::info!(
            catalogs = report.catalogs,
            pages = report.pages,
            failed_pages = report.failed_pages,
            categories = report.categories,
            deleted = report.stale_deleted,
            orphans = report.orphans_deleted,
            "category synchronization finished"
        );
        Ok(report)
    }

    async fn sync_page(&self, apicategories: &[ApiCategory], catalog_id: &CatalogId) -> Result<()> {
        self.sync_categories(apicategories, catalog_id).await?;
        self.sync_category_translations(apicategories).await?;
        Ok(())
    }

    /// Insert new categories, update changed ones and advance `lastsync` of all of them, in
    /// one transaction.
    #[tracing::instrument(
        level = "debug",
        skip(self, apicategories),
        fields(count = apicategories.len())
    )]
    pub async fn sync_categories(
        &self,
        apicategories: &[ApiCategory],
        catalog_id: &CatalogId,
    ) -> Result<CategoryChanges> {
        if apicategories.is_empty() {
            return Ok(CategoryChanges::default());
        }
        let now = now_seconds()?;

        let mut tx = self.store.begin().await?;
        match stage_categories(tx.as_mut(), apicategories, catalog_id, now).await {
            Ok(changes) => {
                tx.commit().await?;
                tracing::debug!(
                    inserted = changes.inserted,
                    updated = changes.updated,
                    touched = changes.touched,
                    "categories synchronized"
                );
                Ok(changes)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// Insert or update per-language titles. The `default` title lives on the category
    /// itself and never becomes a translation.
    ///
    /// Fails with `Error::InvalidReference` before writing anything when a category has no
    /// local row.
    #[tracing::instrument(
        level = "debug",
        skip(self, apicategories),
        fields(count = apicategories.len())
    )]
    pub async fn sync_category_translations(
        &self,
        apicategories: &[ApiCategory],
    ) -> Result<TranslationChanges> {
        if apicategories.is_empty() {
            return Ok(TranslationChanges::default());
        }

        let mut tx = self.store.begin().await?;
        match stage_translations(tx.as_mut(), apicategories).await {
            Ok(changes) => {
                tx.commit().await?;
                tracing::debug!(
                    inserted = changes.inserted,
                    updated = changes.updated,
                    "category translations synchronized"
                );
                Ok(changes)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// Delete translations whose category no longer exists. Returns how many were removed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_orphaned_edflex_category_translations(&self) -> Result<u64> {
        let ids = self.store.find_orphaned_translation_ids().await?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.store.delete_translations(&ids).await
    }
}

fn now_seconds() -> Result<DateTime<Utc>> {
    from_unix_seconds(to_unix_seconds(Utc::now()))
}

async fn rollback(tx: Box<dyn CategoryTransaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "category transaction rollback failed");
    }
}

fn unique_uuids(apicategories: &[ApiCategory]) -> Vec<String> {
    let mut seen = HashSet::new();
    apicategories
        .iter()
        .filter(|c| seen.insert(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}

async fn stage_categories(
    tx: &mut dyn CategoryTransaction,
    apicategories: &[ApiCategory],
    catalog_id: &CatalogId,
    now: DateTime<Utc>,
) -> Result<CategoryChanges> {
    let uuids = unique_uuids(apicategories);
    let mut existing: HashMap<String, Category> = tx
        .find_categories_by_uuids(&uuids)
        .await?
        .into_iter()
        .map(|c| (c.uuid.clone(), c))
        .collect();

    let mut inserts: Vec<NewCategory> = Vec::new();
    let mut updates: Vec<Category> = Vec::new();
    let mut staged: HashSet<&str> = HashSet::new();

    for apicategory in apicategories {
        let title = apicategory.default_title().to_string();
        let position = apicategory.position()?;
        if !staged.insert(apicategory.id.as_str()) {
            continue;
        }

        match existing.remove(&apicategory.id) {
            None => inserts.push(NewCategory {
                uuid: apicategory.id.clone(),
                catalog_uuid: catalog_id.to_string(),
                title,
                position,
                lastsync: now,
            }),
            Some(mut record) => {
                if record.title != title || record.position != position {
                    record.title = title;
                    record.position = position;
                    updates.push(record);
                }
            }
        }
    }

    let mut changes = CategoryChanges {
        inserted: tx.insert_categories(&inserts).await?,
        ..Default::default()
    };
    for record in &updates {
        tx.update_category(record).await?;
        changes.updated += 1;
    }
    changes.touched = tx.touch_categories(&uuids, now).await?;
    Ok(changes)
}

async fn stage_translations(
    tx: &mut dyn CategoryTransaction,
    apicategories: &[ApiCategory],
) -> Result<TranslationChanges> {
    let uuids = unique_uuids(apicategories);
    let local_ids: HashMap<String, i64> = tx
        .find_categories_by_uuids(&uuids)
        .await?
        .into_iter()
        .map(|c| (c.uuid, c.id))
        .collect();

    if let Some(missing) = uuids.iter().find(|uuid| !local_ids.contains_key(*uuid)) {
        return Err(Error::InvalidReference(format!(
            "category '{missing}' has no local row"
        )));
    }

    let existing: HashMap<(String, String), CategoryTranslation> = tx
        .find_translations_by_category_uuids(&uuids)
        .await?
        .into_iter()
        .map(|(uuid, t)| ((uuid, t.language_code.clone()), t))
        .collect();

    let mut inserts: Vec<NewCategoryTranslation> = Vec::new();
    let mut updates: Vec<(i64, String)> = Vec::new();
    let mut staged: HashSet<(&str, &str)> = HashSet::new();

    for apicategory in apicategories {
        let category_id = local_ids[&apicategory.id];
        for (language_code, title) in apicategory.translations() {
            if !staged.insert((apicategory.id.as_str(), language_code)) {
                continue;
            }
            match existing.get(&(apicategory.id.clone(), language_code.to_string())) {
                None => inserts.push(NewCategoryTranslation {
                    category_id,
                    language_code: language_code.to_string(),
                    title: title.to_string(),
                }),
                Some(row) if row.title != title => updates.push((row.id, title.to_string())),
                Some(_) => {}
            }
        }
    }

    let mut changes = TranslationChanges {
        inserted: tx.insert_translations(&inserts).await?,
        ..Default::default()
    };
    for (id, title) in &updates {
        tx.update_translation_title(*id, title).await?;
        changes.updated += 1;
    }
    Ok(changes)
}
