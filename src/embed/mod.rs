//! oEmbed proxy for grouped content links.
//!
//! Given a content URL and its detected type, fetches the provider's oEmbed
//! document. Failures come back as a structured fallback; rendering it is up
//! to the consumer.

use std::time::Duration;

use anyhow::Context;
use log::{debug, warn};
use moka::future::Cache;
use serde_json::Value;
use url::Url;

use crate::config::EmbedSettings;
use crate::grouping::ContentType;

/// oEmbed endpoints per provider.
#[derive(Debug, Clone)]
pub struct EmbedEndpoints {
    pub twitter: String,
    pub instagram: String,
    pub tiktok: String,
}

impl Default for EmbedEndpoints {
    fn default() -> Self {
        Self {
            twitter: "https://publish.twitter.com/oembed".to_string(),
            instagram: "https://graph.facebook.com/v18.0/instagram_oembed".to_string(),
            tiktok: "https://www.tiktok.com/oembed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbedResult {
    /// Provider's oEmbed document as returned
    Embed(Value),
    /// Link-only fallback with the reason the embed is unavailable
    Fallback { url: String, reason: String },
    /// No oEmbed provider for this content type
    Unsupported,
}

impl EmbedResult {
    fn fallback(url: &str, reason: impl Into<String>) -> Self {
        EmbedResult::Fallback {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

pub struct EmbedProxy {
    client: reqwest::Client,
    endpoints: EmbedEndpoints,
    /// Tweets whose embed recently failed; skipped until the entry expires
    failed_tweets: Cache<String, ()>,
    instagram_access_token: Option<String>,
}

impl EmbedProxy {
    pub fn new(settings: &EmbedSettings, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build embed HTTP client")?;

        let failed_tweets = Cache::builder()
            .max_capacity(settings.failure_cache_capacity)
            .time_to_live(Duration::from_secs(settings.failure_ttl_secs))
            .build();

        Ok(Self {
            client,
            endpoints: EmbedEndpoints::default(),
            failed_tweets,
            instagram_access_token: settings.instagram_access_token.clone(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: EmbedEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub async fn fetch(&self, url: &str, content_type: ContentType) -> EmbedResult {
        let request = match content_type {
            ContentType::Twitter => {
                if self.failed_tweets.contains_key(url) {
                    debug!("Skipping cached failed Twitter URL: {}", url);
                    return EmbedResult::fallback(url, "Cached failure - Twitter embed unavailable");
                }
                Url::parse_with_params(
                    &self.endpoints.twitter,
                    &[("url", url), ("omit_script", "true"), ("dnt", "true")],
                )
            },
            ContentType::Instagram => {
                let Some(token) = self.instagram_access_token.as_deref() else {
                    return EmbedResult::fallback(url, "No Instagram access token configured");
                };
                Url::parse_with_params(
                    &self.endpoints.instagram,
                    &[("url", url), ("access_token", token)],
                )
            },
            ContentType::Tiktok => Url::parse_with_params(&self.endpoints.tiktok, &[("url", url)]),
            _ => return EmbedResult::Unsupported,
        };

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid {} oEmbed endpoint: {}", content_type.as_str(), e);
                return EmbedResult::fallback(url, format!("Failed to fetch {} embed", content_type.as_str()));
            },
        };

        let response = match self.client.get(request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Error fetching {} embed for {}: {}", content_type.as_str(), url, e);
                return EmbedResult::fallback(url, format!("Failed to fetch {} embed", content_type.as_str()));
            },
        };

        let status = response.status();
        if !status.is_success() {
            warn!("{} API error for URL {}: {}", content_type.as_str(), url, status);
            if content_type == ContentType::Twitter {
                self.failed_tweets.insert(url.to_string(), ()).await;
            }
            return EmbedResult::fallback(
                url,
                format!("{} API responded with {}", content_type.as_str(), status.as_u16()),
            );
        }

        match response.json::<Value>().await {
            Ok(document) => EmbedResult::Embed(document),
            Err(e) => {
                warn!("Invalid {} embed document for {}: {}", content_type.as_str(), url, e);
                EmbedResult::fallback(url, format!("Failed to fetch {} embed", content_type.as_str()))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with the same response; counts hits.
    async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}/oembed", addr), hits)
    }

    fn proxy(endpoint: &str, instagram_token: Option<&str>) -> EmbedProxy {
        let settings = EmbedSettings {
            instagram_access_token: instagram_token.map(str::to_string),
            ..Default::default()
        };
        EmbedProxy::new(&settings, Duration::from_secs(5))
            .unwrap()
            .with_endpoints(EmbedEndpoints {
                twitter: endpoint.to_string(),
                instagram: endpoint.to_string(),
                tiktok: endpoint.to_string(),
            })
    }

    #[tokio::test]
    async fn test_failed_tweet_is_cached() {
        let (endpoint, hits) = serve("404 Not Found", "{}").await;
        let proxy = proxy(&endpoint, None);
        let tweet = "https://x.com/u/status/1";

        let first = proxy.fetch(tweet, ContentType::Twitter).await;
        assert_eq!(
            first,
            EmbedResult::Fallback {
                url: tweet.into(),
                reason: "twitter API responded with 404".into()
            }
        );

        let second = proxy.fetch(tweet, ContentType::Twitter).await;
        assert!(matches!(second, EmbedResult::Fallback { reason, .. } if reason.starts_with("Cached failure")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_cached() {
        let (endpoint, hits) = serve("500 Internal Server Error", "{}").await;
        let proxy = proxy(&endpoint, None);
        let video = "https://www.tiktok.com/@u/video/1";

        proxy.fetch(video, ContentType::Tiktok).await;
        proxy.fetch(video, ContentType::Tiktok).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embed_document_passthrough() {
        let (endpoint, _) = serve("200 OK", r#"{"html":"<blockquote></blockquote>","version":"1.0"}"#).await;
        let proxy = proxy(&endpoint, Some("token"));

        let result = proxy
            .fetch("https://www.instagram.com/p/abc/", ContentType::Instagram)
            .await;
        let EmbedResult::Embed(document) = result else {
            panic!("expected embed, got {:?}", result);
        };
        assert_eq!(document["html"], "<blockquote></blockquote>");
    }

    #[tokio::test]
    async fn test_unsupported_and_unconfigured() {
        let proxy = proxy("http://127.0.0.1:9/oembed", None);
        for content_type in [
            ContentType::Youtube,
            ContentType::Telegram,
            ContentType::Website,
            ContentType::Unknown,
        ] {
            assert_eq!(
                proxy.fetch("https://example.com", content_type).await,
                EmbedResult::Unsupported
            );
        }

        assert!(matches!(
            proxy.fetch("https://www.instagram.com/p/abc/", ContentType::Instagram).await,
            EmbedResult::Fallback { .. }
        ));
    }
}
