//! Conversation Log: append-only exchange records.
//!
//! Records are immutable once appended. The only other mutation is removal of
//! a whole record by id, and only as an explicit user action. Insertion order
//! is chronological order.
//!
//! Append failures never reach the pipeline caller; they flip the log's
//! health flag instead so operators can notice silent data loss.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::error::{CompanionError, Result};
use crate::types::{DomainId, ExchangeRecord, RecordId, Speaker, Topic};

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Selection criteria for [`AppendLog::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    /// Only records whose topic belongs to this domain.
    pub domain: Option<DomainId>,
    /// Only records with exactly this topic.
    pub topic: Option<Topic>,
    /// Only records from this speaker.
    pub speaker: Option<Speaker>,
    /// Only records at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Keep the most recent N matches (still returned oldest first).
    pub limit: Option<usize>,
}

impl LogFilter {
    /// Match everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a domain.
    #[must_use]
    pub fn domain(mut self, domain: DomainId) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Restrict to a topic.
    #[must_use]
    pub fn topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Restrict to a speaker.
    #[must_use]
    pub fn speaker(mut self, speaker: Speaker) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Restrict to records at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Keep only the most recent `limit` matches.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes every set criterion (ignores `limit`).
    #[must_use]
    pub fn matches(&self, record: &ExchangeRecord) -> bool {
        self.domain.is_none_or(|d| record.domain() == d)
            && self.topic.is_none_or(|t| record.topic == t)
            && self.speaker.is_none_or(|s| record.speaker == s)
            && self.since.is_none_or(|t| record.timestamp >= t)
    }

    /// Apply the filter to records in insertion order.
    #[must_use]
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a ExchangeRecord>) -> Vec<ExchangeRecord> {
        let mut out: Vec<ExchangeRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        if let Some(limit) = self.limit {
            let skip = out.len().saturating_sub(limit);
            out.drain(..skip);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Append-only storage for exchange records.
pub trait AppendLog: Send + Sync {
    /// Append one record.
    ///
    /// # Errors
    /// Backend failure.
    fn append(&self, record: &ExchangeRecord) -> Result<()>;

    /// Records matching `filter`, oldest first.
    ///
    /// # Errors
    /// Backend failure.
    fn query(&self, filter: &LogFilter) -> Result<Vec<ExchangeRecord>>;

    /// Remove one record. Returns whether it existed.
    ///
    /// # Errors
    /// Backend failure.
    fn remove(&self, id: RecordId) -> Result<bool>;

    /// Number of stored records.
    ///
    /// # Errors
    /// Backend failure.
    fn len(&self) -> Result<usize>;
}

/// In-process log.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: RwLock<Vec<ExchangeRecord>>,
}

impl MemoryLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppendLog for MemoryLog {
    fn append(&self, record: &ExchangeRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<ExchangeRecord>> {
        Ok(filter.apply(self.records.read().iter()))
    }

    fn remove(&self, id: RecordId) -> Result<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

// ---------------------------------------------------------------------------
// Conversation log
// ---------------------------------------------------------------------------

/// The pipeline's view of the log: swallows append failures and tracks health.
pub struct ConversationLog {
    store: Arc<dyn AppendLog>,
    healthy: AtomicBool,
    failures: AtomicU64,
}

impl std::fmt::Debug for ConversationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLog")
            .field("healthy", &self.is_healthy())
            .field("failures", &self.append_failures())
            .finish_non_exhaustive()
    }
}

impl ConversationLog {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(store: Arc<dyn AppendLog>) -> Self {
        Self {
            store,
            healthy: AtomicBool::new(true),
            failures: AtomicU64::new(0),
        }
    }

    /// In-memory log.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLog::new()))
    }

    /// Append a record. Returns `false` if the backend rejected it.
    pub fn record(&self, record: &ExchangeRecord) -> bool {
        match self.store.append(record) {
            Ok(()) => {
                self.healthy.store(true, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.healthy.store(false, Ordering::Relaxed);
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(record = %record.id, error = %e, "Conversation log append failed");
                false
            }
        }
    }

    /// The most recent `n` records, oldest first. Empty on backend failure.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<ExchangeRecord> {
        self.store.query(&LogFilter::all().limit(n)).unwrap_or_else(|e| {
            warn!(error = %e, "Conversation log query failed");
            Vec::new()
        })
    }

    /// Records matching `filter`.
    ///
    /// # Errors
    /// Backend failure.
    pub fn query(&self, filter: &LogFilter) -> Result<Vec<ExchangeRecord>> {
        self.store.query(filter)
    }

    /// Remove one record at the user's request.
    ///
    /// # Errors
    /// [`CompanionError::RecordNotFound`] if no such record exists, or a
    /// backend failure.
    pub fn remove(&self, id: RecordId) -> Result<()> {
        if self.store.remove(id)? {
            Ok(())
        } else {
            Err(CompanionError::RecordNotFound(id))
        }
    }

    /// Number of stored records (0 on backend failure).
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `false` once an append has failed, until the next success.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Total failed appends since startup.
    #[must_use]
    pub fn append_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
