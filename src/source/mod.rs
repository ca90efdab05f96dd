//! Global metadata sources.
//!
//! A source is either a local file or an `http(s)` URL. Its content is opaque
//! here; parsing and merging happen in [`GlobalMetadata::from_sources`].

mod http;
mod retry;

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

use crate::package::GlobalMetadata;
use crate::runtime::Runtime;

pub use http::HttpClient;
pub use retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable, classify_error};

const USER_AGENT: &str = concat!("modman-cli/", env!("CARGO_PKG_VERSION"));

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// HTTP client used for remote sources.
pub fn default_client() -> Result<HttpClient> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    Ok(HttpClient::new(client))
}

/// Read every source, returning `(source, content)` pairs in the given order.
#[tracing::instrument(skip(runtime, client))]
pub async fn load_sources<R: Runtime>(
    runtime: &R,
    client: &HttpClient,
    sources: &[String],
) -> Result<Vec<(String, String)>> {
    let reads = sources.iter().map(|source| async move {
        let content = if is_remote(source) {
            client
                .get_text(source)
                .await
                .with_context(|| format!("Failed to download metadata source '{}'", source))?
        } else {
            debug!("Reading metadata source {}", source);
            runtime
                .read_to_string(Path::new(source))
                .with_context(|| format!("Failed to read metadata source '{}'", source))?
        };
        Ok::<_, anyhow::Error>((source.clone(), content))
    });

    try_join_all(reads).await
}

/// Load and merge the global metadata overrides from `sources`.
pub async fn load_metadata<R: Runtime>(
    runtime: &R,
    client: &HttpClient,
    sources: &[String],
) -> Result<GlobalMetadata> {
    if sources.is_empty() {
        return Ok(GlobalMetadata::empty());
    }

    let contents = load_sources(runtime, client, sources).await?;
    let metadata = GlobalMetadata::from_sources(&contents)?;
    info!("Loaded global metadata from {} source(s)", sources.len());
    Ok(metadata)
}
