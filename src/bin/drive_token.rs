use anyhow::{Context, Result};
use drive_relink::cache::MemoryCache;
use drive_relink::config::DEFAULT_SCOPE;
use drive_relink::drive::ServiceAccountAuth;
use drive_relink::util::env as env_util;
use std::sync::Arc;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Operator check: exchange the configured service-account key for a bearer
/// token and print a redacted summary. Set RELINK_TOKEN_OUTPUT_MODE=raw to
/// print the token itself (e.g., for piping into curl).
#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("drive_token");
    dotenv::dotenv().ok();
    init_tracing();

    let credentials_path = env_util::env_req("RELINK_CREDENTIALS_PATH")?;
    let scope = env_util::env_opt("DRIVE_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string());

    let auth = ServiceAccountAuth::new(&credentials_path, &scope, Arc::new(MemoryCache::new()))?;
    let token = auth
        .get_access_token()
        .await
        .context("obtaining access token")?;

    match env_util::env_opt("RELINK_TOKEN_OUTPUT_MODE").as_deref() {
        Some("raw") => println!("{token}"),
        _ => {
            println!("Requested scope: {scope}");
            let prefix: String = token.chars().take(8).collect();
            println!("Got token: token_len={}, prefix={prefix}…", token.len());
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = SubscriberBuilder::default()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
