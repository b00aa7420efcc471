//! HTTP feed client: one JSON endpoint per domain.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{Instrument, debug, warn};

use companion_core::config::FeedConfig;
use companion_core::metrics::spans;
use companion_core::source::InformationSource;
use companion_core::{DomainId, InformationItem, SourceError, Topic};

use crate::error::FeedError;
use crate::types::parse_items;

/// Placeholder in a feed URL replaced by the topic tag.
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// An [`InformationSource`] backed by a JSON HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    name: String,
    http: Client,
    url: String,
    api_key: Option<String>,
    max_retries: u32,
    timeout: Duration,
}

impl HttpFeedSource {
    /// Create a feed client.
    ///
    /// # Errors
    /// [`FeedError::ConfigError`] if the URL is not http(s).
    pub fn new(name: impl Into<String>, config: &FeedConfig) -> Result<Self, FeedError> {
        let url = config.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FeedError::ConfigError(format!(
                "feed url must be http(s), got '{url}'"
            )));
        }
        if config.timeout_ms == 0 {
            return Err(FeedError::ConfigError("timeout_ms must be positive".into()));
        }
        Ok(Self {
            name: name.into(),
            http: Client::new(),
            url: url.to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            max_retries: config.max_retries,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Create the feed for `domain`, named after its id.
    ///
    /// # Errors
    /// See [`new`](Self::new).
    pub fn for_domain(domain: DomainId, config: &FeedConfig) -> Result<Self, FeedError> {
        Self::new(format!("feed:{}", domain.id()), config)
    }

    /// Request URL for `topic`.
    #[must_use]
    pub fn endpoint(&self, topic: Topic) -> String {
        if self.url.contains(TOPIC_PLACEHOLDER) {
            self.url.replace(TOPIC_PLACEHOLDER, topic.tag())
        } else {
            let sep = if self.url.contains('?') { '&' } else { '?' };
            format!("{}{sep}topic={}", self.url, topic.tag())
        }
    }

    /// Fetch and parse the items for `topic`, retrying transport failures.
    ///
    /// # Errors
    /// [`FeedError::ParseError`] on an unreadable body (not retried), or
    /// [`FeedError::RetriesExhausted`] once every attempt has failed.
    pub async fn fetch_items(&self, topic: Topic) -> Result<Vec<InformationItem>, FeedError> {
        let url = self.endpoint(topic);
        let span = tracing::debug_span!(spans::FEED_REQUEST, feed = %self.name, topic = %topic);
        self.fetch_with_retries(&url, topic).instrument(span).await
    }

    async fn fetch_with_retries(&self, url: &str, topic: Topic) -> Result<Vec<InformationItem>, FeedError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retrying feed request (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let mut request = self.http.get(url).timeout(self.timeout);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let start = Instant::now();
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.text().await?;
                    let items = parse_items(&body, topic)?;
                    debug!(
                        items = items.len(),
                        latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Feed fetched"
                    );
                    return Ok(items);
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(url, "Feed returned error: {}", last_error);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(url, "Feed request timed out after {}ms", self.timeout.as_millis());
                    } else {
                        warn!(url, "Feed request failed: {}", last_error);
                    }
                }
            }
        }

        Err(FeedError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl InformationSource for HttpFeedSource {
    async fn fetch(&self, topic: Topic) -> Result<Vec<InformationItem>, SourceError> {
        Ok(self.fetch_items(topic).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
