//! Runtime metrics for the companion pipeline.
//!
//! Lock-free `AtomicU64` counters are bumped on the `handle` path and read on
//! export. Handle latency keeps a short rolling window behind a
//! `parking_lot::Mutex`, read rarely for `/stats` and dashboards.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::CacheOutcome;
use crate::classifier::ClassificationSource;
use crate::types::SafetyDecision;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Atomic counters for per-utterance events.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Utterances handled.
    pub utterances: AtomicU64,
    /// Allow decisions.
    pub decisions_allow: AtomicU64,
    /// Caution decisions.
    pub decisions_caution: AtomicU64,
    /// Block decisions.
    pub decisions_block: AtomicU64,
    /// Topics found by the rule pass.
    pub classified_rule: AtomicU64,
    /// Topics found by the model pass.
    pub classified_model: AtomicU64,
    /// `other` results replaced by personalization.
    pub classified_personalized: AtomicU64,
    /// Utterances left at `other`.
    pub classified_fallback: AtomicU64,
    /// Fresh cache entries served.
    pub cache_hits: AtomicU64,
    /// Lookups that went to the source.
    pub cache_misses: AtomicU64,
    /// Lookups answered with the fallback item.
    pub cache_fallbacks: AtomicU64,
    /// Fallbacks caused by a registered source failing.
    pub fetch_failures: AtomicU64,
    /// Conversation log appends that failed.
    pub log_append_failures: AtomicU64,
    /// Emotion snapshot writes that failed.
    pub snapshot_failures: AtomicU64,
    /// Growth level increments.
    pub level_ups: AtomicU64,
}

impl PipelineCounters {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one decision.
    pub fn record_decision(&self, decision: SafetyDecision) {
        let counter = match decision {
            SafetyDecision::Allow => &self.decisions_allow,
            SafetyDecision::Caution => &self.decisions_caution,
            SafetyDecision::Block => &self.decisions_block,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one classification by the pass that produced it.
    pub fn record_classification(&self, source: ClassificationSource) {
        let counter = match source {
            ClassificationSource::Rule => &self.classified_rule,
            ClassificationSource::Model => &self.classified_model,
            ClassificationSource::Personalized => &self.classified_personalized,
            ClassificationSource::Fallback => &self.classified_fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one cache lookup.
    pub fn record_lookup(&self, outcome: CacheOutcome, source_registered: bool) {
        match outcome {
            CacheOutcome::Hit => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            CacheOutcome::Refreshed => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
            CacheOutcome::Fallback => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                self.cache_fallbacks.fetch_add(1, Ordering::Relaxed);
                if source_registered {
                    self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            utterances: get(&self.utterances),
            decisions: [
                get(&self.decisions_allow),
                get(&self.decisions_caution),
                get(&self.decisions_block),
            ],
            classifications: [
                get(&self.classified_rule),
                get(&self.classified_model),
                get(&self.classified_personalized),
                get(&self.classified_fallback),
            ],
            cache_hits: get(&self.cache_hits),
            cache_misses: get(&self.cache_misses),
            cache_fallbacks: get(&self.cache_fallbacks),
            fetch_failures: get(&self.fetch_failures),
            log_append_failures: get(&self.log_append_failures),
            snapshot_failures: get(&self.snapshot_failures),
            level_ups: get(&self.level_ups),
        }
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Utterances handled.
    pub utterances: u64,
    /// Decisions `[allow, caution, block]`.
    pub decisions: [u64; 3],
    /// Classifications `[rule, model, personalized, fallback]`.
    pub classifications: [u64; 4],
    /// Fresh cache entries served.
    pub cache_hits: u64,
    /// Lookups that went to the source.
    pub cache_misses: u64,
    /// Fallback items served.
    pub cache_fallbacks: u64,
    /// Registered sources that failed.
    pub fetch_failures: u64,
    /// Failed log appends.
    pub log_append_failures: u64,
    /// Failed snapshot writes.
    pub snapshot_failures: u64,
    /// Growth level increments.
    pub level_ups: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let mut family = |name: &str, help: &str, samples: &[(&str, u64)]| {
            out.push_str(&format!("# HELP companion_{name}_total {help}\n"));
            out.push_str(&format!("# TYPE companion_{name}_total counter\n"));
            for (labels, value) in samples {
                out.push_str(&format!("companion_{name}_total{labels} {value}\n"));
            }
        };

        family("utterances", "Utterances handled", &[("", self.utterances)]);
        family(
            "decisions",
            "Safety decisions by outcome",
            &[
                ("{decision=\"allow\"}", self.decisions[0]),
                ("{decision=\"caution\"}", self.decisions[1]),
                ("{decision=\"block\"}", self.decisions[2]),
            ],
        );
        family(
            "classifications",
            "Topic classifications by pass",
            &[
                ("{source=\"rule\"}", self.classifications[0]),
                ("{source=\"model\"}", self.classifications[1]),
                ("{source=\"personalized\"}", self.classifications[2]),
                ("{source=\"fallback\"}", self.classifications[3]),
            ],
        );
        family("cache_hits", "Fresh cache entries served", &[("", self.cache_hits)]);
        family("cache_misses", "Cache lookups that went to the source", &[("", self.cache_misses)]);
        family("cache_fallbacks", "Fallback items served", &[("", self.cache_fallbacks)]);
        family("fetch_failures", "Information source failures", &[("", self.fetch_failures)]);
        family("log_append_failures", "Failed conversation log appends", &[("", self.log_append_failures)]);
        family("snapshot_failures", "Failed emotion snapshot writes", &[("", self.snapshot_failures)]);
        family("level_ups", "Growth level increments", &[("", self.level_ups)]);
        out
    }
}

// ---------------------------------------------------------------------------
// Handle latency
// ---------------------------------------------------------------------------

/// Rolling window of `handle` latencies in milliseconds.
#[derive(Debug)]
pub struct LatencyWindow {
    capacity: usize,
    samples: Mutex<VecDeque<f64>>,
    total: AtomicU64,
}

/// Percentile summary of a [`LatencyWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Slowest sample in the window.
    pub max: f64,
}

impl LatencyWindow {
    /// Keep the last `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            total: AtomicU64::new(0),
        }
    }

    /// Record one sample.
    pub fn record(&self, ms: f64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(ms);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples recorded since startup.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Percentiles over the current window (zeros when empty).
    #[must_use]
    pub fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted: Vec<f64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return LatencyPercentiles::default();
        }
        sorted.sort_by(f64::total_cmp);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let at = |p: f64| sorted[((sorted.len() - 1) as f64 * p).round() as usize];
        LatencyPercentiles {
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[sorted.len() - 1],
        }
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// `tracing` span names used across the pipeline.
pub mod spans {
    /// One `handle` call.
    pub const HANDLE: &str = "companion::handle";
    /// Topic classification.
    pub const CLASSIFY: &str = "companion::classify";
    /// Cache lookup and fetch.
    pub const FETCH: &str = "companion::fetch";
    /// Outbound HTTP feed request.
    pub const FEED_REQUEST: &str = "companion::feed::request";
}
