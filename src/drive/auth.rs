//! Service-account credential provider.
//!
//! Exchanges an RS256-signed JWT assertion for a short-lived bearer token at
//! the key document's token endpoint, and caches the token until near expiry.
//! The three failure shapes are typed so callers can tell a missing key file
//! from a refused exchange, but all of them collapse to "no token" at the
//! pipeline boundary.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::Cache;
use crate::drive::truncate_for_log;

/// Fixed cache key: one token is shared by every resolution in the process.
pub const TOKEN_CACHE_KEY: &str = "drive_sa_access_token";

/// Assertion lifetime requested from the token endpoint.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Shaved off the declared token lifetime when caching.
const EXPIRY_MARGIN_SECS: i64 = 120;
/// Floor for the cached validity window.
const MIN_CACHE_SECS: i64 = 60;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);
const GRANT_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("service account credentials unavailable: {0}")]
    CredentialsUnavailable(String),
    #[error("signing the token assertion failed: {0}")]
    SigningFailed(String),
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

pub struct ServiceAccountAuth {
    http: Client,
    credentials_path: PathBuf,
    scope: String,
    cache: Arc<dyn Cache>,
}

impl ServiceAccountAuth {
    pub fn new(
        credentials_path: impl Into<PathBuf>,
        scope: &str,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("drive-relink/0.1")
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            http,
            credentials_path: credentials_path.into(),
            scope: scope.to_string(),
            cache,
        })
    }

    /// Return a live bearer token, issuing a new one only when the cached
    /// token has expired. The cached window is
    /// `max(60, declared_lifetime - 120)` seconds, so a token is never handed
    /// out with less than a minute of remaining validity.
    pub async fn get_access_token(&self) -> Result<String, TokenError> {
        if let Some(token) = self.cache.get(TOKEN_CACHE_KEY) {
            debug!(target: "drive_auth", "access token cache hit");
            return Ok(token);
        }

        let key = self.load_key()?;
        let assertion = self.build_assertion(&key)?;
        let (token, lifetime) = self.exchange(&key.token_uri, &assertion).await?;

        let ttl = (lifetime - EXPIRY_MARGIN_SECS).max(MIN_CACHE_SECS);
        self.cache
            .put(TOKEN_CACHE_KEY, &token, Duration::from_secs(ttl as u64));
        debug!(target: "drive_auth", lifetime, cached_secs = ttl, "issued new access token");
        Ok(token)
    }

    fn load_key(&self) -> Result<ServiceAccountKey, TokenError> {
        let path = self.credentials_path.display();
        let raw = fs::read_to_string(&self.credentials_path)
            .map_err(|e| TokenError::CredentialsUnavailable(format!("reading {path}: {e}")))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| TokenError::CredentialsUnavailable(format!("parsing {path}: {e}")))?;
        if key.client_email.is_empty() || key.private_key.is_empty() || key.token_uri.is_empty() {
            return Err(TokenError::CredentialsUnavailable(format!(
                "{path} must set client_email, private_key and token_uri"
            )));
        }
        Ok(key)
    }

    fn build_assertion(&self, key: &ServiceAccountKey) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: key.client_email.clone(),
            scope: self.scope.clone(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let enc_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            TokenError::SigningFailed(format!("private key did not parse as RSA PEM: {e}"))
        })?;
        encode(&Header::new(Algorithm::RS256), &claims, &enc_key)
            .map_err(|e| TokenError::SigningFailed(e.to_string()))
    }

    async fn exchange(&self, token_uri: &str, assertion: &str) -> Result<(String, i64), TokenError> {
        let form = [("grant_type", GRANT_TYPE_JWT_BEARER), ("assertion", assertion)];
        let resp = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::TokenExchangeFailed(format!("POST {token_uri}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::TokenExchangeFailed(format!(
                "token endpoint returned {status}: {}",
                truncate_for_log(body, 300)
            )));
        }

        let tr = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| TokenError::TokenExchangeFailed(format!("decoding response: {e}")))?;
        let token = tr
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenError::TokenExchangeFailed("response missing access_token".into()))?;
        Ok((token, tr.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)))
    }
}
