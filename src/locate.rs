//! Local-asset existence probing.
//!
//! Given a resolved filename, tries the upload host for the stem with each
//! tolerated image extension in order and returns the first URL that answers
//! 200 to a HEAD request. The resolved name's own extension is deliberately
//! untrusted: it is stripped and the fixed list is probed instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between the orchestrator and the upload host, so pipeline tests can
/// substitute a canned finder.
#[async_trait]
pub trait AssetFinder: Send + Sync {
    /// First candidate URL whose existence probe succeeds, if any.
    async fn locate(&self, base_name: &str) -> Option<String>;
    /// The locator-unaware URL for a filename as reported (used for failure
    /// rows: the address the asset was expected at).
    fn raw_url(&self, file_name: &str) -> String;
}

pub struct AssetLocator {
    http: Client,
    upload_base: String,
    extensions: Vec<String>,
}

impl AssetLocator {
    pub fn new(upload_base: &str, extensions: &[String]) -> Result<Self> {
        let http = Client::builder()
            .user_agent("drive-relink/0.1")
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            http,
            upload_base: format!("{}/", upload_base.trim_end_matches('/')),
            extensions: extensions.to_vec(),
        })
    }

    fn candidate_url(&self, stem: &str, ext: &str) -> String {
        format!("{}{}.{}", self.upload_base, urlencoding::encode(stem), ext)
    }

    /// Probe one candidate. Transport errors count as "absent", never as a
    /// hard failure of the pipeline.
    async fn exists(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!(target: "locate", url, %err, "probe transport error; treating as absent");
                false
            }
        }
    }
}

/// Filename with the portion after the final dot removed. Names without a
/// stem (".hidden") or without a dot pass through whole.
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

#[async_trait]
impl AssetFinder for AssetLocator {
    async fn locate(&self, base_name: &str) -> Option<String> {
        let stem = strip_extension(base_name);
        for ext in &self.extensions {
            let url = self.candidate_url(stem, ext);
            if self.exists(&url).await {
                debug!(target: "locate", base_name, url = %url, "asset located");
                return Some(url);
            }
        }
        debug!(target: "locate", base_name, tried = self.extensions.len(), "no candidate found");
        None
    }

    fn raw_url(&self, file_name: &str) -> String {
        format!("{}{}", self.upload_base, urlencoding::encode(file_name))
    }
}
