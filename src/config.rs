//! Relink configuration, assembled from the environment.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::util::env;

pub const DEFAULT_NAME_TTL_SECS: u64 = 86_400;
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const DEFAULT_REPORT_DIR: &str = "relink-reports";
const DEFAULT_IMAGE_COLUMNS: &str = "Images,Image,images";
const DEFAULT_IMAGE_EXTS: &str = "png,jpg,jpeg,webp";

/// Everything the pipeline and its collaborators need, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RelinkConfig {
    /// Base URL prefix the rewritten asset links point at (trailing slash kept).
    pub upload_base: String,
    /// Path to the service-account JSON key document.
    pub credentials_path: PathBuf,
    /// TTL for cached Drive display names.
    pub name_cache_ttl: Duration,
    /// Apply (rewrite) vs audit (report-only) mode.
    pub apply: bool,
    /// Candidate image column names, checked in order per record.
    pub image_columns: Vec<String>,
    /// Ordered extension fallback list for existence probes.
    pub image_extensions: Vec<String>,
    /// Directory receiving the monthly failure log and CSV.
    pub report_dir: PathBuf,
    /// Drive API base URL (overridable for tests).
    pub api_base: String,
    /// OAuth scope requested in the token assertion.
    pub scope: String,
}

impl RelinkConfig {
    /// Build from env vars (see the table in the project docs). Fails fast on
    /// the two required keys and on an upload base that is not a URL.
    pub fn from_env() -> Result<Self> {
        env::init_env();

        let upload_base = env::env_req("RELINK_UPLOAD_BASE")?;
        Url::parse(&upload_base)
            .with_context(|| format!("RELINK_UPLOAD_BASE is not a valid URL: {upload_base}"))?;

        let credentials_path = PathBuf::from(env::env_req("RELINK_CREDENTIALS_PATH")?);

        Ok(Self {
            upload_base,
            credentials_path,
            name_cache_ttl: Duration::from_secs(env::env_parse(
                "RELINK_CACHE_TTL_SECS",
                DEFAULT_NAME_TTL_SECS,
            )),
            apply: env::env_flag("RELINK_APPLY", false),
            image_columns: list_env("RELINK_IMAGE_COLUMNS", DEFAULT_IMAGE_COLUMNS),
            image_extensions: list_env("RELINK_IMAGE_EXTS", DEFAULT_IMAGE_EXTS),
            report_dir: PathBuf::from(
                env::env_opt("RELINK_REPORT_DIR").unwrap_or_else(|| DEFAULT_REPORT_DIR.into()),
            ),
            api_base: env::env_opt("DRIVE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            scope: env::env_opt("DRIVE_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.into()),
        })
    }
}

fn list_env(key: &str, default: &str) -> Vec<String> {
    let raw = env::env_opt(key).unwrap_or_else(|| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_env_default_split() {
        let exts = list_env("RELINK_TEST_UNSET_KEY", DEFAULT_IMAGE_EXTS);
        assert_eq!(exts, vec!["png", "jpg", "jpeg", "webp"]);
    }
}
