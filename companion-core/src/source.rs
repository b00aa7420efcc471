//! Outbound information sources.
//!
//! The cache only needs one async function per domain. [`StaticSource`]
//! serves canned items from memory; HTTP feeds live in `companion-feed`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::SourceError;
use crate::types::{InformationItem, Topic};

/// A backing feed of domain information.
#[async_trait]
pub trait InformationSource: Send + Sync {
    /// Fetch the latest items for `topic`.
    ///
    /// # Errors
    /// Any [`SourceError`]; the cache turns every failure into its fallback.
    async fn fetch(&self, topic: Topic) -> Result<Vec<InformationItem>, SourceError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "source"
    }
}

/// In-memory canned items keyed by topic.
#[derive(Debug, Default)]
pub struct StaticSource {
    name: String,
    items: RwLock<HashMap<Topic, Vec<InformationItem>>>,
}

impl StaticSource {
    /// Empty source.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Add items, grouped by their own topic.
    #[must_use]
    pub fn with_items(self, items: impl IntoIterator<Item = InformationItem>) -> Self {
        for item in items {
            self.push(item);
        }
        self
    }

    /// Add one item.
    pub fn push(&self, item: InformationItem) {
        self.items.write().entry(item.topic).or_default().push(item);
    }

    /// Replace all items for `topic`.
    pub fn set(&self, topic: Topic, items: Vec<InformationItem>) {
        self.items.write().insert(topic, items);
    }
}

#[async_trait]
impl InformationSource for StaticSource {
    async fn fetch(&self, topic: Topic) -> Result<Vec<InformationItem>, SourceError> {
        let items = self.items.read().get(&topic).cloned().unwrap_or_default();
        if items.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
