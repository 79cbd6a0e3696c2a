use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language key under which upstream stores the display title.
pub const DEFAULT_TITLE_KEY: &str = "default";

/// Raw upstream content record, kept untyped so missing or odd fields never fail decoding.
pub type RawContent = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCatalog {
    pub id: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogList {
    #[serde(default)]
    pub data: Vec<ApiCatalog>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCategoryAttributes {
    /// Titles keyed by language code, plus the `default` key.
    #[serde(default)]
    pub title: BTreeMap<String, String>,
    /// Kept raw: upstream does not guarantee an integer here.
    #[serde(default)]
    pub position: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCategory {
    pub id: String,
    #[serde(default)]
    pub attributes: ApiCategoryAttributes,
}

impl ApiCategory {
    pub fn new<K, V>(
        id: impl Into<String>,
        titles: impl IntoIterator<Item = (K, V)>,
        position: serde_json::Value,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            attributes: ApiCategoryAttributes {
                title: titles
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
                position,
            },
        }
    }

    pub fn default_title(&self) -> &str {
        self.attributes
            .title
            .get(DEFAULT_TITLE_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Translated titles, excluding the `default` key.
    pub fn translations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .title
            .iter()
            .filter(|(lang, _)| lang.as_str() != DEFAULT_TITLE_KEY)
            .map(|(lang, title)| (lang.as_str(), title.as_str()))
    }

    /// Ordering position. Absent means 0; anything that is not an integer is rejected.
    pub fn position(&self) -> Result<i64> {
        match &self.attributes.position {
            serde_json::Value::Null => Ok(0),
            serde_json::Value::Number(n) => n.as_i64().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "category '{}' position {n} is not an integer",
                    self.id
                ))
            }),
            serde_json::Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
                Error::InvalidInput(format!(
                    "category '{}' position '{s}' is not an integer",
                    self.id
                ))
            }),
            other => Err(Error::InvalidInput(format!(
                "category '{}' position {other} is not an integer",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default, deserialize_with = "deserialize_next")]
    pub next: bool,
}

/// Upstream signals "next" either as a boolean or as the URL of the next page.
fn deserialize_next<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(match v {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Null => false,
        _ => true,
    })
}

/// One page of categories for a catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoriesPage {
    #[serde(default)]
    pub data: Vec<ApiCategory>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    #[serde(rename = "nestingLevel")]
    pub nesting_level: u32,
}

impl CategoryFilter {
    /// Only top-level categories are mirrored.
    pub fn top_level() -> Self {
        Self { nesting_level: 1 }
    }
}
