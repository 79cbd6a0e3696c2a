use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream catalog identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub String);

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("catalog id is empty".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Local mirror of an upstream category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub uuid: String,
    pub catalog_uuid: String,
    /// Title under the upstream `default` language key.
    pub title: String,
    pub position: i64,
    pub lastsync: DateTime<Utc>,
}

/// A category staged for insertion (no local id yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub uuid: String,
    pub catalog_uuid: String,
    pub title: String,
    pub position: i64,
    pub lastsync: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTranslation {
    pub id: i64,
    pub category_id: i64,
    pub language_code: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategoryTranslation {
    pub category_id: i64,
    pub language_code: String,
    pub title: String,
}

/// Content record normalized from the raw upstream payload.
///
/// Ephemeral: produced by the mapper and handed to the activity manager, never
/// persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContent {
    pub edflexid: Option<String>,
    pub name: Option<String>,
    pub intro: String,
    pub language: Option<String>,
    pub difficulty: Option<String>,
    pub difficulty_formatted: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub type_formatted: String,
    pub duration: String,
    pub duration_formatted: String,
    pub author: String,
    pub downloadscormzip: Option<String>,
    pub image_small: Option<String>,
    pub image_medium: Option<String>,
    pub image_big: Option<String>,
    pub url: String,
}

/// A course activity created from an imported upstream content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedActivity {
    pub id: i64,
    pub contentid: String,
    pub name: Option<String>,
    pub intro: String,
    pub language: Option<String>,
    pub difficulty_formatted: String,
    pub type_formatted: String,
    pub duration_formatted: String,
    pub author: String,
    pub scorm_url: Option<String>,
    pub image_url: Option<String>,
    pub url: String,
    pub lastsync: DateTime<Utc>,
}

/// Which synchronization a job drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Categories,
    Contents,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Categories => f.write_str("categories"),
            SyncKind::Contents => f.write_str("contents"),
        }
    }
}

/// Storage representation of timestamps (unix seconds).
pub fn to_unix_seconds(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

pub fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {secs} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_id_rejects_blank() {
        assert!(CatalogId::new("  ").is_err());
        assert_eq!(CatalogId::new("cat-1").unwrap().as_str(), "cat-1");
    }

    #[test]
    fn unix_seconds_truncate_subsecond_precision() {
        let t = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let back = from_unix_seconds(to_unix_seconds(t)).unwrap();
        assert_eq!(back.timestamp(), 1_700_000_000);
        assert!(back <= t);
    }

    #[test]
    fn normalized_content_serializes_type_key() {
        let c = NormalizedContent {
            content_type: Some("video".to_string()),
            ..Default::default()
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "video");
    }
}
