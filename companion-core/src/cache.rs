//! Information Cache: TTL-bounded retrieval with a safe fallback.
//!
//! - A fresh entry (`age < domain TTL`) is returned without touching the source.
//! - A stale or missing entry triggers one bounded fetch; success replaces it.
//! - Errors, timeouts and empty results yield a single `"System"` fallback
//!   item, which is never cached, so the next call retries the real source.
//!
//! The LRU map sits behind a mutex that is never held across an `.await`.
//! Concurrent fetches of the same topic are last-write-wins.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::SourceError;
use crate::lexicon::LexiconStore;
use crate::source::InformationSource;
use crate::types::{DomainId, InformationItem, Topic};

/// Attribution carried by the fallback item.
pub const FALLBACK_SOURCE: &str = "System";

#[derive(Debug, Clone)]
struct CacheEntry {
    items: Vec<InformationItem>,
    fetched_at: Instant,
}

/// Where the items of a lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a fresh cache entry.
    Hit,
    /// Fetched from the source and cached.
    Refreshed,
    /// The source failed; the fallback item was returned.
    Fallback,
}

/// Items plus how they were obtained.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Items to show (never empty).
    pub items: Vec<InformationItem>,
    /// Provenance.
    pub outcome: CacheOutcome,
}

/// Topic-keyed cache in front of the per-domain information sources.
pub struct InformationCache {
    lexicons: Arc<LexiconStore>,
    sources: HashMap<DomainId, Arc<dyn InformationSource>>,
    entries: Mutex<LruCache<Topic, CacheEntry>>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for InformationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InformationCache")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("entries", &self.entries.lock().len())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl InformationCache {
    /// Create an empty cache. Domains without a registered source always
    /// get the fallback item.
    #[must_use]
    pub fn new(lexicons: Arc<LexiconStore>, config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            lexicons,
            sources: HashMap::new(),
            entries: Mutex::new(LruCache::new(capacity)),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        }
    }

    /// Register the backing source for `domain`.
    #[must_use]
    pub fn with_source(mut self, domain: DomainId, source: Arc<dyn InformationSource>) -> Self {
        self.register(domain, source);
        self
    }

    /// Register (or replace) the backing source for `domain`.
    pub fn register(&mut self, domain: DomainId, source: Arc<dyn InformationSource>) {
        self.sources.insert(domain, source);
    }

    /// Whether `domain` has a backing source.
    #[must_use]
    pub fn has_source(&self, domain: DomainId) -> bool {
        self.sources.contains_key(&domain)
    }

    /// Latest items for `topic`: cached, freshly fetched, or the fallback.
    pub async fn fetch_latest(&self, topic: Topic) -> Vec<InformationItem> {
        self.lookup(topic).await.items
    }

    /// Like [`fetch_latest`](Self::fetch_latest), also reporting provenance.
    pub async fn lookup(&self, topic: Topic) -> Lookup {
        let domain = topic.domain();
        let ttl = self.lexicons.get(domain).cache_ttl;

        if let Some(items) = self.fresh(topic, ttl) {
            debug!(topic = %topic, "Cache hit");
            return Lookup { items, outcome: CacheOutcome::Hit };
        }

        match self.fetch_from_source(topic).await {
            Ok(items) => {
                debug!(topic = %topic, items = items.len(), "Cache refreshed");
                self.entries.lock().put(
                    topic,
                    CacheEntry {
                        items: items.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Lookup { items, outcome: CacheOutcome::Refreshed }
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Fetch failed, serving fallback");
                Lookup {
                    items: vec![fallback_item(topic)],
                    outcome: CacheOutcome::Fallback,
                }
            }
        }
    }

    /// Drop the entry for `topic`.
    pub fn invalidate(&self, topic: Topic) -> bool {
        self.entries.lock().pop(&topic).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached topics (fresh or stale).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh(&self, topic: Topic, ttl: Duration) -> Option<Vec<InformationItem>> {
        let mut entries = self.entries.lock();
        let entry = entries.get(&topic)?;
        (entry.fetched_at.elapsed() < ttl).then(|| entry.items.clone())
    }

    async fn fetch_from_source(&self, topic: Topic) -> Result<Vec<InformationItem>, SourceError> {
        let source = self
            .sources
            .get(&topic.domain())
            .ok_or_else(|| SourceError::Unavailable(format!("no source for {}", topic.domain())))?;

        let items = tokio::time::timeout(self.fetch_timeout, source.fetch(topic))
            .await
            .map_err(|_| SourceError::Timeout(duration_ms(self.fetch_timeout)))??;

        if items.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(items)
    }
}

/// The single unverified item served when a fetch fails.
#[must_use]
pub fn fallback_item(topic: Topic) -> InformationItem {
    InformationItem {
        title: "最新情報を取得できませんでした".to_string(),
        summary: "現在、情報源に接続できません。この内容は未確認の情報です。公式の情報源で最新の内容をご確認ください。"
            .to_string(),
        source: FALLBACK_SOURCE.to_string(),
        published_at: Utc::now(),
        topic,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::types::NewsTopic;

    const POLITICS: Topic = Topic::News(NewsTopic::Politics);

    /// Counts calls; fails while `failing` is set.
    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl InformationSource for Counting {
        async fn fetch(&self, topic: Topic) -> Result<Vec<InformationItem>, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Request("connection refused".into()));
            }
            Ok(vec![InformationItem {
                title: format!("fetch {n}"),
                summary: "本文".into(),
                source: "通信社".into(),
                published_at: Utc::now(),
                topic,
            }])
        }
    }

    struct Stalled;

    #[async_trait]
    impl InformationSource for Stalled {
        async fn fetch(&self, _topic: Topic) -> Result<Vec<InformationItem>, SourceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn cache(source: Arc<dyn InformationSource>) -> InformationCache {
        let lexicons = Arc::new(LexiconStore::builtin().expect("builtin"));
        InformationCache::new(lexicons, &CacheConfig::default()).with_source(DomainId::News, source)
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_and_refresh_after() {
        let source = Arc::new(Counting::default());
        let cache = cache(source.clone());

        let first = cache.lookup(POLITICS).await;
        assert_eq!(first.outcome, CacheOutcome::Refreshed);
        let second = cache.lookup(POLITICS).await;
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(first.items, second.items);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // News TTL is 30 minutes.
        tokio::time::advance(Duration::from_secs(30 * 60 + 1)).await;
        let third = cache.lookup(POLITICS).await;
        assert_eq!(third.outcome, CacheOutcome::Refreshed);
        assert_eq!(third.items[0].title, "fetch 2");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_serves_uncached_fallback() {
        let source = Arc::new(Counting::default());
        source.failing.store(true, Ordering::SeqCst);
        let cache = cache(source.clone());

        let items = cache.fetch_latest(POLITICS).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, FALLBACK_SOURCE);
        assert!(cache.is_empty());

        cache.fetch_latest(POLITICS).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2, "fallback is not cached");

        source.failing.store(false, Ordering::SeqCst);
        let items = cache.fetch_latest(POLITICS).await;
        assert_eq!(items[0].source, "通信社");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out() {
        let cache = cache(Arc::new(Stalled));
        let lookup = cache.lookup(POLITICS).await;
        assert_eq!(lookup.outcome, CacheOutcome::Fallback);
    }

    #[tokio::test]
    async fn missing_source_is_fallback() {
        let lexicons = Arc::new(LexiconStore::builtin().expect("builtin"));
        let cache = InformationCache::new(lexicons, &CacheConfig::default());
        assert!(!cache.has_source(DomainId::News));
        let lookup = cache.lookup(POLITICS).await;
        assert_eq!(lookup.outcome, CacheOutcome::Fallback);
        assert_eq!(lookup.items[0].topic, POLITICS);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let source = Arc::new(Counting::default());
        let cache = cache(source.clone());
        cache.fetch_latest(POLITICS).await;
        assert!(cache.invalidate(POLITICS));
        assert!(!cache.invalidate(POLITICS));
        cache.fetch_latest(POLITICS).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn fallback_is_attributed_to_system() {
        let item = fallback_item(POLITICS);
        assert_eq!(item.source, "System");
        assert!(item.summary.contains("未確認"));
    }
}
