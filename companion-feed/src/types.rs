//! Wire types for JSON feed documents.
//!
//! Two shapes are accepted:
//!
//! ```json
//! [{ "title": "...", "summary": "...", "source": "...", "published_at": "..." }]
//! { "source": "Feed Name", "items": [{ "title": "...", "description": "..." }] }
//! ```
//!
//! An item without its own `source` inherits the envelope's. Items that end
//! up unattributed are still returned; the safety policy drops them.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use companion_core::{InformationItem, Topic};

use crate::error::FeedError;

/// One item as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WireItem {
    /// Headline.
    pub title: String,
    /// Body text; `description` and `body` are accepted as aliases.
    #[serde(default, alias = "description", alias = "body")]
    pub summary: String,
    /// Attribution.
    #[serde(default)]
    pub source: Option<String>,
    /// RFC 3339 publication time.
    #[serde(default, alias = "publishedAt", alias = "pubDate")]
    pub published_at: Option<DateTime<Utc>>,
}

/// A feed document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedDocument {
    /// Bare array of items.
    Items(Vec<WireItem>),
    /// Object wrapping the items with feed-level metadata.
    Envelope {
        /// Feed-level attribution.
        #[serde(default)]
        source: Option<String>,
        /// The items.
        #[serde(alias = "articles", alias = "entries")]
        items: Vec<WireItem>,
    },
}

impl FeedDocument {
    /// Map the document onto `topic`. `now` stamps undated items.
    #[must_use]
    pub fn into_items(self, topic: Topic, now: DateTime<Utc>) -> Vec<InformationItem> {
        let (default_source, items) = match self {
            Self::Items(items) => (None, items),
            Self::Envelope { source, items } => (source, items),
        };
        items
            .into_iter()
            .map(|item| InformationItem {
                title: item.title.trim().to_string(),
                summary: item.summary.trim().to_string(),
                source: item
                    .source
                    .or_else(|| default_source.clone())
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                published_at: item.published_at.unwrap_or(now),
                topic,
            })
            .collect()
    }
}

/// Parse a response body into items for `topic`.
///
/// # Errors
/// [`FeedError::ParseError`] if the body is neither accepted shape.
pub fn parse_items(body: &str, topic: Topic) -> Result<Vec<InformationItem>, FeedError> {
    let document: FeedDocument = serde_json::from_str(body)?;
    Ok(document.into_items(topic, Utc::now()))
}
