//! Edflex self-service API client.
//!
//! Authenticates with OAuth2 client credentials and caches the bearer token until shortly
//! before it expires. Content lookups are split into batches of at most
//! `CONTENT_BATCH_SIZE` ids and streamed batch by batch.

use async_trait::async_trait;
use edflex_core::api::models::{CatalogList, CategoriesPage, CategoryFilter, RawContent};
use edflex_core::api::traits::{ContentStream, EdflexApi};
use edflex_core::config::EdflexConfig;
use edflex_core::models::CatalogId;
use edflex_core::{Error, Result};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Upstream rejects `filter[id]` lists longer than this.
pub const CONTENT_BATCH_SIZE: usize = 50;
/// Tokens are refreshed this long before upstream expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    data: Vec<RawContent>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(resp: TokenResponse, now: Instant) -> Self {
        let lifetime = Duration::from_secs(resp.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        Self {
            value: resp.access_token,
            refresh_at: now + lifetime,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

#[derive(Clone)]
pub struct EdflexApiClient {
    client: Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl std::fmt::Debug for EdflexApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdflexApiClient")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl EdflexApiClient {
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::backend("build edflex http client", e))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(cfg: &EdflexConfig) -> Result<Self> {
        Self::new(
            cfg.api_url.clone(),
            cfg.client_id.clone(),
            cfg.client_secret.clone(),
            cfg.http_timeout,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Request a fresh token. `Ok(None)` means upstream refused the credentials.
    #[instrument(level = "debug", skip(self))]
    async fn request_token(&self) -> Result<Option<CachedToken>> {
        let resp = self
            .client
            .post(self.url("/api/oauth/v2/token"))
            .json(&serde_json::json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if status.is_client_error() {
            tracing::warn!(%status, "edflex token request rejected");
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::backend(format!("edflex token request returned {status}"), e))?;
        let token: TokenResponse = resp.json().await.map_err(Error::backend_reqwest)?;
        Ok(Some(CachedToken::new(token, Instant::now())))
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }
        let token = self.request_token().await?.ok_or_else(|| {
            Error::Connectivity("edflex rejected the client credentials".to_string())
        })?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            // Token revoked upstream: drop it so the next call re-authenticates.
            *self.token.write().await = None;
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::backend(format!("GET {path} returned {status}"), e))?;
        resp.json::<T>().await.map_err(Error::backend_reqwest)
    }

    #[instrument(level = "debug", skip(self, ids), fields(batch_len = ids.len()))]
    async fn fetch_contents_batch(&self, ids: Vec<String>) -> Result<Vec<(String, RawContent)>> {
        let query = content_query(&ids);
        let resp: ContentsResponse = self.get_json("/api/selfservice/contents", &query).await?;
        Ok(key_contents(resp.data, &ids))
    }
}

fn transport_err(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::Connectivity(format!("edflex api unreachable: {e}"))
    } else {
        Error::backend_reqwest(e)
    }
}

fn category_query(filter: CategoryFilter, page: u32, per_page: u32) -> Vec<(String, String)> {
    vec![
        ("filter[nestingLevel]".to_string(), filter.nesting_level.to_string()),
        ("page[number]".to_string(), page.to_string()),
        ("page[size]".to_string(), per_page.to_string()),
    ]
}

fn content_query(ids: &[String]) -> Vec<(String, String)> {
    vec![
        ("filter[id]".to_string(), ids.join(",")),
        ("page[size]".to_string(), ids.len().to_string()),
    ]
}

/// Split ids into request-sized batches, dropping blanks and duplicates. Ids are sent
/// verbatim so returned records key back to the caller's ids.
fn content_batches(ids: &[String]) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| !id.trim().is_empty() && seen.insert(id.as_str()))
        .cloned()
        .collect();
    unique
        .chunks(CONTENT_BATCH_SIZE)
        .map(<[String]>::to_vec)
        .collect()
}

/// Key upstream records by id, keeping only ids that were asked for.
fn key_contents(data: Vec<RawContent>, requested: &[String]) -> Vec<(String, RawContent)> {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    data.into_iter()
        .filter_map(|raw| {
            let id = match raw.get("id")? {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            requested.contains(id.as_str()).then_some((id, raw))
        })
        .collect()
}

#[async_trait]
impl EdflexApi for EdflexApiClient {
    #[instrument(level = "debug", skip(self))]
    async fn get_catalogs(&self) -> Result<CatalogList> {
        self.get_json("/api/selfservice/catalogs", &[]).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_categories(
        &self,
        catalog_id: &CatalogId,
        filter: CategoryFilter,
        page: u32,
        per_page: u32,
    ) -> Result<CategoriesPage> {
        let path = format!("/api/selfservice/catalogs/{catalog_id}/categories");
        self.get_json(&path, &category_query(filter, page, per_page))
            .await
    }

    #[instrument(level = "debug", skip(self, ids), fields(ids = ids.len()))]
    async fn get_contents_by_ids(&self, ids: &[String]) -> Result<ContentStream> {
        let client = self.clone();
        let stream = futures_util::stream::iter(content_batches(ids))
            .then(move |batch| {
                let client = client.clone();
                async move { client.fetch_contents_batch(batch).await }
            })
            .map_ok(|records| futures_util::stream::iter(records.into_iter().map(Ok::<_, Error>)))
            .try_flatten();
        Ok(Box::pin(stream))
    }

    #[instrument(level = "debug", skip(self))]
    async fn can_connect_to_the_api(&self) -> Result<bool> {
        let token = self.request_token().await?;
        let ok = token.is_some();
        *self.token.write().await = token;
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn batches_respect_upstream_limit() {
        let batches = content_batches(&ids(120));
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(batches[2][0], "c100");
        assert!(content_batches(&[]).is_empty());
    }

    #[test]
    fn batches_drop_blank_and_duplicate_ids() {
        let input = vec!["a".to_string(), " ".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(content_batches(&input), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn batches_keep_ids_verbatim() {
        let input = vec![" a".to_string(), "a".to_string()];
        assert_eq!(content_batches(&input), vec![vec![" a".to_string(), "a".to_string()]]);
    }

    #[test]
    fn queries_use_json_api_parameters() {
        let q = category_query(CategoryFilter::top_level(), 3, 16);
        assert_eq!(
            q,
            vec![
                ("filter[nestingLevel]".to_string(), "1".to_string()),
                ("page[number]".to_string(), "3".to_string()),
                ("page[size]".to_string(), "16".to_string()),
            ]
        );
        let q = content_query(&["a".to_string(), "b".to_string()]);
        assert_eq!(q[0], ("filter[id]".to_string(), "a,b".to_string()));
    }

    #[test]
    fn contents_are_keyed_by_requested_id() {
        let data = vec![
            json!({"id": "c1", "attributes": {}}),
            json!({"id": 7, "attributes": {}}),
            json!({"id": "unasked"}),
            json!({"attributes": {}}),
        ];
        let keyed = key_contents(data, &["c1".to_string(), "7".to_string(), "c3".to_string()]);
        let keys: Vec<&str> = keyed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["c1", "7"]);
    }

    #[test]
    fn token_refreshes_before_expiry() {
        let now = Instant::now();
        let token = CachedToken::new(
            TokenResponse {
                access_token: "t".to_string(),
                expires_in: 3600,
            },
            now,
        );
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(3541)));

        let short = CachedToken::new(
            TokenResponse {
                access_token: "t".to_string(),
                expires_in: 30,
            },
            now,
        );
        assert!(!short.is_fresh(now));
    }

    #[test]
    fn token_response_defaults_lifetime() {
        let t: TokenResponse = serde_json::from_value(json!({"access_token": "abc"})).unwrap();
        assert_eq!(t.expires_in, DEFAULT_TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn client_trims_trailing_slash_and_hides_secret() {
        let c = EdflexApiClient::new(
            "https://api.edflex.test/",
            "id",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            c.url("/api/selfservice/catalogs"),
            "https://api.edflex.test/api/selfservice/catalogs"
        );
        assert!(!format!("{c:?}").contains("secret"));
    }
}
