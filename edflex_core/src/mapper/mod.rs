//! Maps raw upstream content records to `NormalizedContent`.
//!
//! Pure and infallible: any missing or mistyped field maps to `None` or an empty string.

pub mod formatter;

use crate::api::models::RawContent;
use crate::mapper::formatter::{Formatter, LabelFormatter};
use crate::models::NormalizedContent;
use std::sync::Arc;

#[derive(Clone)]
pub struct ContentMapper {
    formatter: Arc<dyn Formatter>,
}

impl Default for ContentMapper {
    fn default() -> Self {
        Self::new(Arc::new(LabelFormatter))
    }
}

impl ContentMapper {
    pub fn new(formatter: Arc<dyn Formatter>) -> Self {
        Self { formatter }
    }

    /// Map every record, keeping input order and the caller's key (index or content id).
    pub fn map_contents<K>(
        &self,
        contents: impl IntoIterator<Item = (K, RawContent)>,
    ) -> Vec<(K, NormalizedContent)> {
        contents
            .into_iter()
            .map(|(key, raw)| (key, self.map_content(&raw)))
            .collect()
    }

    pub fn map_content(&self, raw: &RawContent) -> NormalizedContent {
        let content_type = str_at(raw, "/attributes/type");
        let difficulty = str_at(raw, "/attributes/difficulty");
        let duration = str_at(raw, "/attributes/duration").unwrap_or_default();
        let author = str_at(raw, "/attributes/author/fullName")
            .or_else(|| str_at(raw, "/attributes/creator/name"))
            .unwrap_or_default();

        NormalizedContent {
            edflexid: id_at(raw),
            name: str_at(raw, "/attributes/title"),
            intro: str_at(raw, "/attributes/description").unwrap_or_default(),
            language: str_at(raw, "/attributes/language"),
            difficulty_formatted: self.formatter.format_difficulty(difficulty.as_deref()),
            difficulty,
            type_formatted: self.formatter.format_type(content_type.as_deref()),
            content_type,
            duration_formatted: self.formatter.format_duration(Some(&duration)),
            duration,
            author,
            downloadscormzip: str_at(raw, "/links/downloadScormZip"),
            image_small: str_at(raw, "/attributes/image/smallUrl"),
            image_medium: str_at(raw, "/attributes/image/mediumUrl"),
            image_big: str_at(raw, "/attributes/image/bigUrl"),
            url: str_at(raw, "/attributes/url").unwrap_or_default(),
        }
    }
}

fn str_at(raw: &RawContent, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Upstream ids are usually strings but numeric ids are accepted.
fn id_at(raw: &RawContent) -> Option<String> {
    match raw.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
