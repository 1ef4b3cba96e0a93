use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use log::{debug, warn};

use crate::db::models::TokenMetadata;

/// Resolves a descriptor URI to a metadata record.
///
/// Implementations report absence instead of failing: a fetch or parse error
/// is `None` for the caller.
pub trait MetadataSource: Send + Sync + 'static {
    fn fetch(&self, uri: &str) -> impl Future<Output = Option<TokenMetadata>> + Send;
}

/// Token metadata fetcher over HTTP(S).
///
/// One best-effort GET per call: no retry, no caching.
#[derive(Clone)]
pub struct MetadataFetcher {
    client: reqwest::Client,
}

impl MetadataFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build metadata HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch_document(&self, uri: &str) -> anyhow::Result<TokenMetadata> {
        let response = self.client.get(uri).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("unexpected status code {}", response.status());
        }

        let metadata = response.json::<TokenMetadata>().await?;
        Ok(metadata)
    }
}

impl MetadataSource for MetadataFetcher {
    async fn fetch(&self, uri: &str) -> Option<TokenMetadata> {
        match self.fetch_document(uri).await {
            Ok(metadata) => {
                debug!("Fetched metadata from {}", uri);
                Some(metadata)
            },
            Err(e) => {
                warn!("Failed to fetch metadata from {}: {:#}", uri, e);
                None
            },
        }
    }
}
