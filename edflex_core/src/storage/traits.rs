use crate::models::{Category, CategoryTranslation, NewCategory, NewCategoryTranslation};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Category and translation tables.
///
/// Writes that must be all-or-nothing go through a `CategoryTransaction` obtained from
/// `begin()`; the remaining methods run in their own implicit transaction.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CategoryTransaction>>;

    /// Delete categories whose `lastsync` is strictly before `before`. Returns the count.
    async fn delete_categories_synced_before(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Translation ids whose `category_id` matches no category.
    async fn find_orphaned_translation_ids(&self) -> Result<Vec<i64>>;

    async fn delete_translations(&self, ids: &[i64]) -> Result<u64>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn get_category_by_uuid(&self, uuid: &str) -> Result<Option<Category>>;

    async fn list_translations(&self) -> Result<Vec<CategoryTranslation>>;
}

/// Unit of work over the category tables.
///
/// Nothing is visible to other readers until `commit`. Dropping the transaction without
/// committing discards every write made through it.
#[async_trait]
pub trait CategoryTransaction: Send {
    async fn find_categories_by_uuids(&mut self, uuids: &[String]) -> Result<Vec<Category>>;

    async fn insert_categories(&mut self, rows: &[NewCategory]) -> Result<u64>;

    /// Overwrite title and position of an existing row (matched by `id`).
    async fn update_category(&mut self, category: &Category) -> Result<()>;

    /// Set `lastsync` for every category with one of the given uuids.
    async fn touch_categories(&mut self, uuids: &[String], at: DateTime<Utc>) -> Result<u64>;

    /// Existing translations of the given categories, paired with the category uuid.
    async fn find_translations_by_category_uuids(
        &mut self,
        uuids: &[String],
    ) -> Result<Vec<(String, CategoryTranslation)>>;

    async fn insert_translations(&mut self, rows: &[NewCategoryTranslation]) -> Result<u64>;

    async fn update_translation_title(&mut self, id: i64, title: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
