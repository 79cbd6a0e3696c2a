use crate::jobs::contents::DEFAULT_STALENESS_HOURS;
use crate::jobs::scheduler::parse_cron;
use crate::sync::{DEFAULT_CATEGORY_PAGE_SIZE, DEFAULT_CONTENT_CHUNK_SIZE};
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://edflex.db?mode=rwc";
pub const DEFAULT_CATEGORIES_CRON: &str = "0 1 * * *";
pub const DEFAULT_CONTENTS_CRON: &str = "30 1 * * *";

/// Runtime configuration of the synchronization service.
#[derive(Clone)]
pub struct EdflexConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub database_url: String,
    pub http_timeout: Duration,
    pub category_page_size: u32,
    pub content_chunk_size: usize,
    pub content_staleness: chrono::Duration,
    pub categories_cron: String,
    pub contents_cron: String,
}

impl fmt::Debug for EdflexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdflexConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("database_url", &self.database_url)
            .field("http_timeout", &self.http_timeout)
            .field("category_page_size", &self.category_page_size)
            .field("content_chunk_size", &self.content_chunk_size)
            .field("content_staleness", &self.content_staleness)
            .field("categories_cron", &self.categories_cron)
            .field("contents_cron", &self.contents_cron)
            .finish()
    }
}

impl EdflexConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::InvalidInput(format!("{key} is required")))
        };

        let api_url = required("EDFLEX_API_URL")?;
        let client_id = required("EDFLEX_CLIENT_ID")?;
        let client_secret = required("EDFLEX_CLIENT_SECRET")?;

        let database_url =
            lookup("EDFLEX_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let http_timeout_ms = lookup("EDFLEX_HTTP_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(20_000);
        let category_page_size = lookup("EDFLEX_CATEGORY_PAGE_SIZE")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_CATEGORY_PAGE_SIZE);
        let content_chunk_size = lookup("EDFLEX_CONTENT_CHUNK_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CONTENT_CHUNK_SIZE);
        let staleness_hours = lookup("EDFLEX_CONTENT_STALENESS_HOURS")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_STALENESS_HOURS);
        let categories_cron = lookup("EDFLEX_CATEGORIES_CRON")
            .unwrap_or_else(|| DEFAULT_CATEGORIES_CRON.to_string());
        let contents_cron =
            lookup("EDFLEX_CONTENTS_CRON").unwrap_or_else(|| DEFAULT_CONTENTS_CRON.to_string());

        let cfg = Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            database_url,
            http_timeout: Duration::from_millis(http_timeout_ms),
            category_page_size,
            content_chunk_size,
            content_staleness: chrono::Duration::hours(staleness_hours),
            categories_cron,
            contents_cron,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "api_url '{}' must be an http(s) URL",
                self.api_url
            )));
        }
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(Error::InvalidInput("client credentials are empty".to_string()));
        }
        if self.database_url.trim().is_empty() {
            return Err(Error::InvalidInput("database_url is empty".to_string()));
        }
        if self.http_timeout.is_zero() {
            return Err(Error::InvalidInput("http_timeout must be > 0".to_string()));
        }
        if self.category_page_size == 0 {
            return Err(Error::InvalidInput("category_page_size must be > 0".to_string()));
        }
        if self.content_chunk_size == 0 {
            return Err(Error::InvalidInput("content_chunk_size must be > 0".to_string()));
        }
        if self.content_staleness <= chrono::Duration::zero() {
            return Err(Error::InvalidInput("content_staleness must be > 0".to_string()));
        }
        parse_cron(&self.categories_cron)?;
        parse_cron(&self.contents_cron)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("EDFLEX_API_URL", "https://api.edflex.test/"),
        ("EDFLEX_CLIENT_ID", "client"),
        ("EDFLEX_CLIENT_SECRET", "s3cret"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = EdflexConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(cfg.api_url, "https://api.edflex.test");
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.http_timeout, Duration::from_millis(20_000));
        assert_eq!(cfg.category_page_size, 16);
        assert_eq!(cfg.content_chunk_size, 200);
        assert_eq!(cfg.content_staleness, chrono::Duration::hours(22));
        assert_eq!(cfg.categories_cron, "0 1 * * *");
        assert_eq!(cfg.contents_cron, "30 1 * * *");
    }

    #[test]
    fn missing_secret_is_rejected() {
        let err = EdflexConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("EDFLEX_CLIENT_SECRET"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EDFLEX_CONTENT_CHUNK_SIZE", "0"));
        assert!(EdflexConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EDFLEX_CONTENTS_CRON", "every day"));
        assert!(EdflexConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("EDFLEX_API_URL", "ftp://nope");
        assert!(EdflexConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = EdflexConfig::from_lookup(lookup(REQUIRED)).unwrap();
        let shown = format!("{cfg:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("s3cret"));
    }
}
