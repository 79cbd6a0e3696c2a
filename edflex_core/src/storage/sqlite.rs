//! SQLite-backed category storage.
//!
//! Both tables live in the same database file as the activity table so a single pool can
//! be shared by the whole process.
//!
//! Usage:
//! ```ignore
//! let pool = connect_pool("sqlite://edflex.db?mode=rwc").await?;
//! let store = SqliteCategoryStore::new(pool).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;

use crate::models::{
    from_unix_seconds, to_unix_seconds, Category, CategoryTranslation, NewCategory,
    NewCategoryTranslation,
};
use crate::storage::traits::{CategoryStore, CategoryTransaction};
use crate::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS edflex_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    catalog_uuid TEXT NOT NULL,
    title TEXT NOT NULL,
    position INTEGER NOT NULL,
    lastsync INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS edflex_categories_lastsync_idx ON edflex_categories(lastsync);

CREATE TABLE IF NOT EXISTS edflex_category_translations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL,
    language_code TEXT NOT NULL,
    title TEXT NOT NULL,
    UNIQUE (category_id, language_code)
);
"#;

/// Open a pool for `url`, creating the database file when missing.
///
/// In-memory databases get a single long-lived connection, otherwise every new
/// connection would see its own empty database.
pub async fn connect_pool(url: &str) -> Result<SqlitePool> {
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");

    let mut opts = SqliteConnectOptions::from_str(url)
        .map_err(Error::sqlx("sqlite_connect_options"))?
        .create_if_missing(true);
    if !in_memory {
        opts = opts.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_opts = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    pool_opts
        .connect_with(opts)
        .await
        .map_err(Error::sqlx("sqlite_connect"))
}

#[derive(Debug, Clone)]
pub struct SqliteCategoryStore {
    pool: SqlitePool,
}

impl SqliteCategoryStore {
    /// Wrap `pool` and create the category tables if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(Error::sqlx("sqlite_category_store_migration"))?;
        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::backend("sqlite_category_store", e)
}

fn row_to_category(row: &SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id").map_err(db_err)?,
        uuid: row.try_get("uuid").map_err(db_err)?,
        catalog_uuid: row.try_get("catalog_uuid").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        position: row.try_get("position").map_err(db_err)?,
        lastsync: from_unix_seconds(row.try_get("lastsync").map_err(db_err)?)?,
    })
}

fn row_to_translation(row: &SqliteRow) -> Result<CategoryTranslation> {
    Ok(CategoryTranslation {
        id: row.try_get("id").map_err(db_err)?,
        category_id: row.try_get("category_id").map_err(db_err)?,
        language_code: row.try_get("language_code").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
    })
}

#[async_trait]
impl CategoryStore for SqliteCategoryStore {
    async fn begin(&self) -> Result<Box<dyn CategoryTransaction>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteCategoryTransaction { tx }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_categories_synced_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM edflex_categories WHERE lastsync < ?1")
            .bind(to_unix_seconds(before))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn find_orphaned_translation_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id
              FROM edflex_category_translations t
              LEFT JOIN edflex_categories c ON c.id = t.category_id
             WHERE c.id IS NULL
             ORDER BY t.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| r.try_get::<i64, _>("id").map_err(db_err))
            .collect()
    }

    async fn delete_translations(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb =
            QueryBuilder::<Sqlite>::new("DELETE FROM edflex_category_translations WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");

        let res = qb.build().execute(&self.pool).await.map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, uuid, catalog_uuid, title, position, lastsync FROM edflex_categories ORDER BY catalog_uuid, position, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_category).collect()
    }

    async fn get_category_by_uuid(&self, uuid: &str) -> Result<Option<Category>> {
        let row = sqlx::query(
            "SELECT id, uuid, catalog_uuid, title, position, lastsync FROM edflex_categories WHERE uuid = ?1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn list_translations(&self) -> Result<Vec<CategoryTranslation>> {
        let rows = sqlx::query(
            "SELECT id, category_id, language_code, title FROM edflex_category_translations ORDER BY category_id, language_code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_translation).collect()
    }
}

/// Owned sqlx transaction. Dropped without `commit` it rolls back.
pub struct SqliteCategoryTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl CategoryTransaction for SqliteCategoryTransaction {
    async fn find_categories_by_uuids(&mut self, uuids: &[String]) -> Result<Vec<Category>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, uuid, catalog_uuid, title, position, lastsync FROM edflex_categories WHERE uuid IN (",
        );
        let mut sep = qb.separated(", ");
        for uuid in uuids {
            sep.push_bind(uuid.as_str());
        }
        sep.push_unseparated(")");

        let rows = qb
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_category).collect()
    }

    async fn insert_categories(&mut self, rows: &[NewCategory]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO edflex_categories (uuid, catalog_uuid, title, position, lastsync) ",
        );
        qb.push_values(rows, |mut b, row| {
            b.push_bind(row.uuid.as_str())
                .push_bind(row.catalog_uuid.as_str())
                .push_bind(row.title.as_str())
                .push_bind(row.position)
                .push_bind(to_unix_seconds(row.lastsync));
        });

        let res = qb.build().execute(&mut *self.tx).await.map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn update_category(&mut self, category: &Category) -> Result<()> {
        let res =
            sqlx::query("UPDATE edflex_categories SET title = ?1, position = ?2 WHERE id = ?3")
                .bind(&category.title)
                .bind(category.position)
                .bind(category.id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("category id {}", category.id)));
        }
        Ok(())
    }

    async fn touch_categories(&mut self, uuids: &[String], at: DateTime<Utc>) -> Result<u64> {
        if uuids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE edflex_categories SET lastsync = ");
        qb.push_bind(to_unix_seconds(at));
        qb.push(" WHERE uuid IN (");
        let mut sep = qb.separated(", ");
        for uuid in uuids {
            sep.push_bind(uuid.as_str());
        }
        sep.push_unseparated(")");

        let res = qb.build().execute(&mut *self.tx).await.map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn find_translations_by_category_uuids(
        &mut self,
        uuids: &[String],
    ) -> Result<Vec<(String, CategoryTranslation)>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT c.uuid AS category_uuid, t.id, t.category_id, t.language_code, t.title
              FROM edflex_category_translations t
              JOIN edflex_categories c ON c.id = t.category_id
             WHERE c.uuid IN ("#,
        );
        let mut sep = qb.separated(", ");
        for uuid in uuids {
            sep.push_bind(uuid.as_str());
        }
        sep.push_unseparated(")");

        let rows = qb
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| {
                let uuid: String = r.try_get("category_uuid").map_err(db_err)?;
                Ok((uuid, row_to_translation(r)?))
            })
            .collect()
    }

    async fn insert_translations(&mut self, rows: &[NewCategoryTranslation]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO edflex_category_translations (category_id, language_code, title) ",
        );
        qb.push_values(rows, |mut b, row| {
            b.push_bind(row.category_id)
                .push_bind(row.language_code.as_str())
                .push_bind(row.title.as_str());
        });

        let res = qb.build().execute(&mut *self.tx).await.map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn update_translation_title(&mut self, id: i64, title: &str) -> Result<()> {
        let res = sqlx::query("UPDATE edflex_category_translations SET title = ?1 WHERE id = ?2")
            .bind(title)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("category translation id {id}")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn new_category(uuid: &str, synced: i64) -> NewCategory {
        NewCategory {
            uuid: uuid.to_string(),
            catalog_uuid: "catalog-1".to_string(),
            title: format!("Title {uuid}"),
            position: 1,
            lastsync: at(synced),
        }
    }

    async fn store() -> SqliteCategoryStore {
        SqliteCategoryStore::new(memory_pool().await).await.unwrap()
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        let n = tx
            .insert_categories(&[new_category("a", 100), new_category("b", 100)])
            .await
            .unwrap();
        assert_eq!(n, 2);
        tx.commit().await.unwrap();

        let all = store.list_categories().await.unwrap();
        assert_eq!(all.len(), 2);
        let a = store.get_category_by_uuid("a").await.unwrap().unwrap();
        assert_eq!(a.title, "Title a");
        assert_eq!(a.lastsync, at(100));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = store().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_categories(&[new_category("a", 100)]).await.unwrap();
        }
        assert!(store.list_categories().await.unwrap().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert_categories(&[new_category("b", 100)]).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn touch_and_stale_delete() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_categories(&[new_category("old", 100), new_category("fresh", 100)])
            .await
            .unwrap();
        let touched = tx
            .touch_categories(&["fresh".to_string(), "missing".to_string()], at(200))
            .await
            .unwrap();
        assert_eq!(touched, 1);
        tx.commit().await.unwrap();

        let deleted = store.delete_categories_synced_before(at(200)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_category_by_uuid("old").await.unwrap().is_none());
        assert!(store.get_category_by_uuid("fresh").await.unwrap().is_some());

        // Strictly before: a row synced exactly at the cutoff survives.
        assert_eq!(store.delete_categories_synced_before(at(200)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn translations_lookup_update_and_orphans() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_categories(&[new_category("a", 100)]).await.unwrap();
        let a = tx.find_categories_by_uuids(&["a".to_string()]).await.unwrap();
        let a_id = a[0].id;
        tx.insert_translations(&[
            NewCategoryTranslation {
                category_id: a_id,
                language_code: "en".to_string(),
                title: "A".to_string(),
            },
            NewCategoryTranslation {
                category_id: a_id + 100,
                language_code: "en".to_string(),
                title: "Orphan".to_string(),
            },
        ])
        .await
        .unwrap();

        let found = tx
            .find_translations_by_category_uuids(&["a".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "a");
        tx.update_translation_title(found[0].1.id, "A2").await.unwrap();
        tx.commit().await.unwrap();

        let orphans = store.find_orphaned_translation_ids().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(store.delete_translations(&orphans).await.unwrap(), 1);
        assert_eq!(store.delete_translations(&[]).await.unwrap(), 0);

        let left = store.list_translations().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].title, "A2");
    }

    #[tokio::test]
    async fn duplicate_translation_language_is_rejected() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        let row = NewCategoryTranslation {
            category_id: 1,
            language_code: "fr".to_string(),
            title: "Un".to_string(),
        };
        tx.insert_translations(&[row.clone()]).await.unwrap();
        assert!(tx.insert_translations(&[row]).await.is_err());
    }

    #[tokio::test]
    async fn update_missing_rows_is_not_found() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        let ghost = Category {
            id: 999,
            uuid: "ghost".to_string(),
            catalog_uuid: "c".to_string(),
            title: "t".to_string(),
            position: 0,
            lastsync: at(0),
        };
        assert!(matches!(
            tx.update_category(&ghost).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            tx.update_translation_title(999, "x").await,
            Err(Error::NotFound(_))
        ));
    }
}
