use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::activity::traits::{ActivityManager, ContentIdChunks};
use crate::models::{from_unix_seconds, to_unix_seconds, ImportedActivity, NormalizedContent};
use crate::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS edflex_activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contentid TEXT NOT NULL,
    name TEXT,
    intro TEXT NOT NULL DEFAULT '',
    language TEXT,
    difficulty_formatted TEXT NOT NULL DEFAULT '',
    type_formatted TEXT NOT NULL DEFAULT '',
    duration_formatted TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    scorm_url TEXT,
    image_url TEXT,
    url TEXT NOT NULL DEFAULT '',
    lastsync INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS edflex_activities_contentid_idx ON edflex_activities(contentid);
CREATE INDEX IF NOT EXISTS edflex_activities_lastsync_idx ON edflex_activities(lastsync);
"#;

/// Activity manager over the local `edflex_activities` table.
///
/// Several activities may reference the same upstream content (one per course it was
/// imported into); they are refreshed and removed together.
#[derive(Debug, Clone)]
pub struct SqliteActivityManager {
    pool: SqlitePool,
}

impl SqliteActivityManager {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(Error::sqlx("sqlite_activity_manager_migration"))?;
        Ok(Self { pool })
    }

    /// Create an activity from a normalized content, marked as synchronized at `synced_at`.
    #[tracing::instrument(
        level = "debug",
        skip(self, content),
        fields(contentid = ?content.edflexid)
    )]
    pub async fn import_activity(
        &self,
        content: &NormalizedContent,
        synced_at: DateTime<Utc>,
    ) -> Result<i64> {
        let contentid = content
            .edflexid
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidInput("content has no edflex id".to_string()))?;

        let res = sqlx::query(
            r#"
            INSERT INTO edflex_activities
                (contentid, name, intro, language, difficulty_formatted, type_formatted,
                 duration_formatted, author, scorm_url, image_url, url, lastsync)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(contentid)
        .bind(&content.name)
        .bind(&content.intro)
        .bind(&content.language)
        .bind(&content.difficulty_formatted)
        .bind(&content.type_formatted)
        .bind(&content.duration_formatted)
        .bind(&content.author)
        .bind(&content.downloadscormzip)
        .bind(&content.image_medium)
        .bind(&content.url)
        .bind(to_unix_seconds(synced_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(res.last_insert_rowid())
    }

    pub async fn list_activities(&self) -> Result<Vec<ImportedActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, contentid, name, intro, language, difficulty_formatted, type_formatted,
                   duration_formatted, author, scorm_url, image_url, url, lastsync
              FROM edflex_activities
             ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_activity).collect()
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::backend("sqlite_activity_manager", e)
}

fn row_to_activity(row: &SqliteRow) -> Result<ImportedActivity> {
    Ok(ImportedActivity {
        id: row.try_get("id").map_err(db_err)?,
        contentid: row.try_get("contentid").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        intro: row.try_get("intro").map_err(db_err)?,
        language: row.try_get("language").map_err(db_err)?,
        difficulty_formatted: row.try_get("difficulty_formatted").map_err(db_err)?,
        type_formatted: row.try_get("type_formatted").map_err(db_err)?,
        duration_formatted: row.try_get("duration_formatted").map_err(db_err)?,
        author: row.try_get("author").map_err(db_err)?,
        scorm_url: row.try_get("scorm_url").map_err(db_err)?,
        image_url: row.try_get("image_url").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        lastsync: from_unix_seconds(row.try_get("lastsync").map_err(db_err)?)?,
    })
}

/// Keyset cursor over outdated content ids.
struct OutdatedCursor {
    pool: SqlitePool,
    maxlastsync: i64,
    after_id: i64,
    remaining: Option<usize>,
    chunk_size: usize,
}

impl OutdatedCursor {
    async fn next_chunk(mut self) -> Result<Option<(Vec<String>, Self)>> {
        let limit = match self.remaining {
            Some(remaining) => remaining.min(self.chunk_size),
            None => self.chunk_size,
        };
        if limit == 0 {
            return Ok(None);
        }

        // Grouped so a content imported into several courses is requested once.
        let rows = sqlx::query(
            r#"
            SELECT contentid, MIN(id) AS first_id
              FROM edflex_activities
             WHERE lastsync < ?1
             GROUP BY contentid
            HAVING MIN(id) > ?2
             ORDER BY first_id
             LIMIT ?3
            "#,
        )
        .bind(self.maxlastsync)
        .bind(self.after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get::<String, _>("contentid").map_err(db_err)?);
            self.after_id = row.try_get("first_id").map_err(db_err)?;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= ids.len();
        }
        tracing::debug!(chunk_len = ids.len(), after_id = self.after_id, "outdated content ids");
        Ok(Some((ids, self)))
    }
}

#[async_trait]
impl ActivityManager for SqliteActivityManager {
    async fn get_outdated_edflex_contentids_in_chunks(
        &self,
        maxlastsync: DateTime<Utc>,
        max_records: Option<usize>,
        chunk_size: usize,
    ) -> Result<ContentIdChunks> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be > 0".to_string()));
        }
        let cursor = OutdatedCursor {
            pool: self.pool.clone(),
            maxlastsync: to_unix_seconds(maxlastsync),
            after_id: 0,
            remaining: max_records,
            chunk_size,
        };
        Ok(Box::pin(futures_util::stream::try_unfold(
            cursor,
            OutdatedCursor::next_chunk,
        )))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(contents = contents.len()))]
    async fn update_imported_activities_from_contents(
        &self,
        contents: &[NormalizedContent],
    ) -> Result<u64> {
        if contents.is_empty() {
            return Ok(0);
        }
        let now = to_unix_seconds(Utc::now());
        let mut updated = 0;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for content in contents {
            let Some(contentid) = content.edflexid.as_deref() else {
                tracing::warn!("skipping mapped content without edflex id");
                continue;
            };
            let res = sqlx::query(
                r#"
                UPDATE edflex_activities
                   SET name = ?1, intro = ?2, language = ?3, difficulty_formatted = ?4,
                       type_formatted = ?5, duration_formatted = ?6, author = ?7,
                       scorm_url = ?8, image_url = ?9, url = ?10, lastsync = ?11
                 WHERE contentid = ?12
                "#,
            )
            .bind(&content.name)
            .bind(&content.intro)
            .bind(&content.language)
            .bind(&content.difficulty_formatted)
            .bind(&content.type_formatted)
            .bind(&content.duration_formatted)
            .bind(&content.author)
            .bind(&content.downloadscormzip)
            .bind(&content.image_medium)
            .bind(&content.url)
            .bind(now)
            .bind(contentid)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            updated += res.rows_affected();
        }
        tx.commit().await.map_err(db_err)?;

        Ok(updated)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(contentids = contentids.len()))]
    async fn delete_scorms_by_contentids(&self, contentids: &[String]) -> Result<u64> {
        if contentids.is_empty() {
            return Ok(0);
        }
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "DELETE FROM edflex_activities WHERE contentid IN (",
        );
        let mut sep = qb.separated(", ");
        for id in contentids {
            sep.push_bind(id.as_str());
        }
        sep.push_unseparated(")");

        let res = qb.build().execute(&self.pool).await.map_err(db_err)?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use chrono::TimeZone;
    use futures_util::TryStreamExt;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn content(id: &str) -> NormalizedContent {
        NormalizedContent {
            edflexid: Some(id.to_string()),
            name: Some(format!("Content {id}")),
            ..Default::default()
        }
    }

    async fn manager_with(ids: &[(&str, i64)]) -> SqliteActivityManager {
        let manager = SqliteActivityManager::new(memory_pool().await).await.unwrap();
        for (id, synced) in ids {
            manager.import_activity(&content(id), at(*synced)).await.unwrap();
        }
        manager
    }

    async fn collect(
        manager: &SqliteActivityManager,
        max: Option<usize>,
        chunk: usize,
    ) -> Vec<Vec<String>> {
        manager
            .get_outdated_edflex_contentids_in_chunks(at(1_000), max, chunk)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chunks_only_outdated_ids_in_order() {
        let manager =
            manager_with(&[("c1", 10), ("c2", 2_000), ("c3", 10), ("c4", 10), ("c5", 10)]).await;
        let chunks = collect(&manager, None, 2).await;
        assert_eq!(
            chunks,
            vec![
                vec!["c1".to_string(), "c3".to_string()],
                vec!["c4".to_string(), "c5".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn max_records_caps_total_ids() {
        let manager =
            manager_with(&[("c1", 10), ("c2", 10), ("c3", 10), ("c4", 10), ("c5", 10)]).await;
        let chunks = collect(&manager, Some(3), 2).await;
        let total: usize = chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert_eq!(chunks[1], vec!["c3".to_string()]);

        assert!(collect(&manager, Some(0), 2).await.is_empty());
    }

    #[tokio::test]
    async fn shared_content_is_listed_once() {
        let manager = manager_with(&[("c1", 10), ("c1", 10), ("c2", 10)]).await;
        let chunks = collect(&manager, None, 200).await;
        assert_eq!(chunks, vec![vec!["c1".to_string(), "c2".to_string()]]);
    }

    #[tokio::test]
    async fn update_refreshes_fields_and_lastsync() {
        let manager = manager_with(&[("c1", 10), ("c1", 10), ("c2", 10)]).await;
        let mut fresh = content("c1");
        fresh.name = Some("Renamed".to_string());
        fresh.downloadscormzip = Some("https://e.test/zip".to_string());

        let updated = manager
            .update_imported_activities_from_contents(&[fresh, NormalizedContent::default()])
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let all = manager.list_activities().await.unwrap();
        for a in all.iter().filter(|a| a.contentid == "c1") {
            assert_eq!(a.name.as_deref(), Some("Renamed"));
            assert_eq!(a.scorm_url.as_deref(), Some("https://e.test/zip"));
            assert!(a.lastsync > at(1_000));
        }
        let c2 = all.iter().find(|a| a.contentid == "c2").unwrap();
        assert_eq!(c2.lastsync, at(10));
    }

    #[tokio::test]
    async fn delete_removes_every_matching_activity() {
        let manager = manager_with(&[("c1", 10), ("c1", 10), ("c2", 10)]).await;
        let deleted = manager
            .delete_scorms_by_contentids(&["c1".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(manager.list_activities().await.unwrap().len(), 1);
        assert_eq!(manager.delete_scorms_by_contentids(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn import_requires_an_id() {
        let manager = manager_with(&[]).await;
        let err = manager
            .import_activity(&NormalizedContent::default(), at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn import_stores_trimmed_id() {
        let manager = manager_with(&[]).await;
        let content = NormalizedContent {
            edflexid: Some("  c1 ".to_string()),
            ..Default::default()
        };
        manager.import_activity(&content, at(0)).await.unwrap();

        let activities = manager.list_activities().await.unwrap();
        assert_eq!(activities[0].contentid, "c1");
        let mut chunks = manager
            .get_outdated_edflex_contentids_in_chunks(at(10), None, 10)
            .await
            .unwrap();
        assert_eq!(chunks.try_next().await.unwrap(), Some(vec!["c1".to_string()]));
    }
}
