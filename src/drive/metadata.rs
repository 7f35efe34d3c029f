//! Drive file-metadata resolver.
//!
//! Fetches the display name for an opaque file id, requesting only the `name`
//! field. Names are cached per id with a configurable TTL so re-imports of the
//! same catalog don't re-hit the API. Every failure degrades to `None`; the
//! caller decides the fallback.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::drive::auth::ServiceAccountAuth;
use crate::drive::truncate_for_log;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Seam between the orchestrator and the metadata API, so pipeline tests can
/// substitute a canned resolver.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn get_filename(&self, file_id: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    name: Option<String>,
}

pub struct DriveMetadata {
    http: Client,
    api_base: String,
    auth: ServiceAccountAuth,
    cache: Arc<dyn Cache>,
    name_ttl: Duration,
}

impl DriveMetadata {
    /// `api_base` defaults to the public Drive endpoint; override it in tests.
    pub fn new(
        api_base: Option<&str>,
        auth: ServiceAccountAuth,
        cache: Arc<dyn Cache>,
        name_ttl: Duration,
    ) -> Result<Self> {
        let api_base = api_base
            .unwrap_or("https://www.googleapis.com")
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent("drive-relink/0.1")
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            http,
            api_base,
            auth,
            cache,
            name_ttl,
        })
    }

    fn cache_key(file_id: &str) -> String {
        format!("drive_name_{file_id}")
    }
}

#[async_trait]
impl NameResolver for DriveMetadata {
    async fn get_filename(&self, file_id: &str) -> Option<String> {
        let key = Self::cache_key(file_id);
        if let Some(name) = self.cache.get(&key).filter(|n| !n.is_empty()) {
            debug!(target: "drive_meta", file_id, "name cache hit");
            return Some(name);
        }

        let token = match self.auth.get_access_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(target: "drive_meta", file_id, %err, "no access token; skipping lookup");
                return None;
            }
        };

        let url = format!(
            "{}/drive/v3/files/{}?fields=name&supportsAllDrives=true",
            self.api_base, file_id
        );
        let resp = match self.http.get(&url).bearer_auth(&token).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(target: "drive_meta", file_id, %err, "metadata request failed");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                target: "drive_meta",
                file_id,
                %status,
                body = %truncate_for_log(body, 200),
                "metadata lookup rejected"
            );
            return None;
        }

        let meta = match resp.json::<FileMetadata>().await {
            Ok(meta) => meta,
            Err(err) => {
                warn!(target: "drive_meta", file_id, %err, "metadata response did not decode");
                return None;
            }
        };
        let name = meta.name.filter(|n| !n.is_empty())?;

        self.cache.put(&key, &name, self.name_ttl);
        debug!(target: "drive_meta", file_id, name = %name, "resolved drive filename");
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_cache_hit_needs_no_token_or_network() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        cache.put(
            &DriveMetadata::cache_key("F1"),
            "238.png",
            Duration::from_secs(60),
        );
        // Bogus credentials path: a cache hit must return before auth runs.
        let auth = ServiceAccountAuth::new(
            "/nonexistent/sa.json",
            "https://www.googleapis.com/auth/drive.readonly",
            Arc::clone(&cache),
        )
        .unwrap();
        let meta =
            DriveMetadata::new(None, auth, Arc::clone(&cache), Duration::from_secs(60)).unwrap();
        assert_eq!(meta.get_filename("F1").await, Some("238.png".to_string()));
    }

    #[tokio::test]
    async fn test_empty_cached_name_counts_as_miss_and_no_token_yields_none() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        cache.put(&DriveMetadata::cache_key("F2"), "", Duration::from_secs(60));
        let auth = ServiceAccountAuth::new(
            "/nonexistent/sa.json",
            "https://www.googleapis.com/auth/drive.readonly",
            Arc::clone(&cache),
        )
        .unwrap();
        let meta =
            DriveMetadata::new(None, auth, Arc::clone(&cache), Duration::from_secs(60)).unwrap();
        // Falls through to the token path, which fails (missing credentials),
        // which must collapse to None rather than an error.
        assert_eq!(meta.get_filename("F2").await, None);
    }
}
