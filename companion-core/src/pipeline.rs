//! Pipeline Orchestrator: the single per-utterance entry point.
//!
//! `handle` runs a fixed sequence:
//!
//! 1. append the user record (placeholder emotion and topic)
//! 2. classify the topic
//! 3. fetch information through the cache
//! 4. evaluate the utterance and compose the reply, disclaimer first
//! 5. on Block, replace the reply with the refusal
//! 6. append the companion record with the derived emotion
//! 7. feed that emotion to the growth engine
//!
//! Logging and the emotion update observe the final decision. Nothing in the
//! sequence returns an error; every failure degrades to a safe reply.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, debug, field};

use crate::cache::{CacheOutcome, InformationCache, fallback_item};
use crate::classifier::{LabelPredictor, TopicClassifier};
use crate::config::{CompanionConfig, PersistenceConfig};
use crate::emotion::{EmotionEngine, MemorySnapshots, SnapshotStore};
use crate::error::{CompanionError, Result};
use crate::lexicon::LexiconStore;
use crate::log::{AppendLog, ConversationLog, LogFilter, MemoryLog};
use crate::metrics::{LatencyWindow, PipelineCounters, spans};
use crate::persistence::SqliteStore;
use crate::safety::{PolicyBook, SafetyPolicy};
use crate::source::InformationSource;
use crate::types::{DomainId, Emotion, ExchangeRecord, SafetyDecision, Speaker, Topic};

/// What the presentation layer gets back for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Text to show or speak. Never empty.
    pub reply: String,
    /// Resolved topic.
    pub topic: Topic,
    /// Safety decision for the utterance.
    pub decision: SafetyDecision,
    /// The companion's emotion for this turn.
    pub emotion: Emotion,
}

/// The wired pipeline. Collaborators are injected; there is no global state.
#[derive(Debug)]
pub struct Pipeline {
    classifier: TopicClassifier,
    policies: PolicyBook,
    cache: InformationCache,
    log: ConversationLog,
    emotion: EmotionEngine,
    counters: Arc<PipelineCounters>,
    latency: LatencyWindow,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        classifier: TopicClassifier,
        policies: PolicyBook,
        cache: InformationCache,
        log: ConversationLog,
        emotion: EmotionEngine,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            classifier,
            policies,
            cache,
            log,
            emotion,
            counters,
            latency: LatencyWindow::default(),
        }
    }

    /// Handle one utterance in `domain`.
    pub async fn handle(&self, utterance: &str, domain: DomainId) -> Reply {
        let span = tracing::info_span!(
            spans::HANDLE,
            domain = %domain,
            topic = field::Empty,
            decision = field::Empty,
            score = field::Empty,
        );
        let start = Instant::now();
        let reply = self.run(utterance, domain).instrument(span).await;
        #[allow(clippy::cast_precision_loss)]
        self.latency.record(start.elapsed().as_micros() as f64 / 1000.0);
        reply
    }

    async fn run(&self, utterance: &str, domain: DomainId) -> Reply {
        self.counters.utterances.fetch_add(1, Ordering::Relaxed);

        // 1. User turn; emotion and topic are placeholders.
        self.append(&ExchangeRecord::new(Speaker::User, utterance, Emotion::Neutral, domain.other()));

        // 2. Classify.
        let history = if self.classifier.needs_history(domain) {
            self.log.query(&LogFilter::all().domain(domain)).unwrap_or_default()
        } else {
            Vec::new()
        };
        let classification = tracing::debug_span!(spans::CLASSIFY)
            .in_scope(|| self.classifier.classify(utterance, domain, &history));
        let topic = classification.topic;
        self.counters.record_classification(classification.source);
        Span::current().record("topic", field::display(topic));

        // 3. Fetch.
        let lookup = self
            .cache
            .lookup(topic)
            .instrument(tracing::debug_span!(spans::FETCH))
            .await;
        self.counters
            .record_lookup(lookup.outcome, self.cache.has_source(domain));

        // 4. Evaluate and compose.
        let policy = self.policies.get(domain);
        let evaluation = policy.evaluate(utterance);
        let decision = evaluation.decision;
        self.counters.record_decision(decision);
        Span::current().record("decision", field::display(decision));
        Span::current().record("score", evaluation.score);

        let admitted = SafetyPolicy::attributed(lookup.items);
        let fallback_used = lookup.outcome == CacheOutcome::Fallback || admitted.is_empty();
        let item = admitted.into_iter().next().unwrap_or_else(|| fallback_item(topic));

        // 5. Block discards the fetched content entirely.
        let text = match decision {
            SafetyDecision::Block => policy.refusal().to_string(),
            SafetyDecision::Caution | SafetyDecision::Allow => policy.compose(&item, decision),
        };

        // 6. Companion turn.
        let emotion = self.emotion.derive_emotion(utterance, decision, fallback_used);
        self.append(
            &ExchangeRecord::new(Speaker::Companion, text.clone(), emotion, topic)
                .with_explicit(classification.is_explicit()),
        );

        // 7. Growth.
        let level_before = self.emotion.state().growth_level;
        if !self.emotion.update(emotion) {
            self.counters.snapshot_failures.fetch_add(1, Ordering::Relaxed);
        }
        if self.emotion.state().growth_level > level_before {
            self.counters.level_ups.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            topic = %topic,
            decision = %decision,
            emotion = %emotion,
            fallback = fallback_used,
            "Utterance handled"
        );

        Reply {
            reply: text,
            topic,
            decision,
            emotion,
        }
    }

    fn append(&self, record: &ExchangeRecord) {
        if !self.log.record(record) {
            self.counters.log_append_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Topic classifier.
    #[must_use]
    pub fn classifier(&self) -> &TopicClassifier {
        &self.classifier
    }

    /// Per-domain safety policies.
    #[must_use]
    pub fn policies(&self) -> &PolicyBook {
        &self.policies
    }

    /// Information cache.
    #[must_use]
    pub fn cache(&self) -> &InformationCache {
        &self.cache
    }

    /// Conversation log.
    #[must_use]
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Emotion/growth engine.
    #[must_use]
    pub fn emotion(&self) -> &EmotionEngine {
        &self.emotion
    }

    /// Shared counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    /// Handle latency window.
    #[must_use]
    pub fn latency(&self) -> &LatencyWindow {
        &self.latency
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Default wiring from a [`CompanionConfig`]. Any collaborator can be
/// overridden before [`build`](Self::build).
pub struct PipelineBuilder {
    config: CompanionConfig,
    lexicons: Option<Arc<LexiconStore>>,
    log_store: Option<Arc<dyn AppendLog>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    sources: Vec<(DomainId, Arc<dyn InformationSource>)>,
    predictors: Vec<(DomainId, Arc<dyn LabelPredictor>)>,
    counters: Option<Arc<PipelineCounters>>,
}

impl PipelineBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: CompanionConfig) -> Self {
        Self {
            config,
            lexicons: None,
            log_store: None,
            snapshots: None,
            sources: Vec::new(),
            predictors: Vec::new(),
            counters: None,
        }
    }

    /// Use an already loaded lexicon store.
    #[must_use]
    pub fn lexicons(mut self, lexicons: Arc<LexiconStore>) -> Self {
        self.lexicons = Some(lexicons);
        self
    }

    /// Use `store` for the conversation log.
    #[must_use]
    pub fn log_store(mut self, store: Arc<dyn AppendLog>) -> Self {
        self.log_store = Some(store);
        self
    }

    /// Use `store` for emotion snapshots.
    #[must_use]
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Register the information source for `domain`.
    #[must_use]
    pub fn source(mut self, domain: DomainId, source: Arc<dyn InformationSource>) -> Self {
        self.sources.push((domain, source));
        self
    }

    /// Install a predictor for `domain`, replacing any fitted one.
    #[must_use]
    pub fn predictor(mut self, domain: DomainId, predictor: Arc<dyn LabelPredictor>) -> Self {
        self.predictors.push((domain, predictor));
        self
    }

    /// Share an existing counter set.
    #[must_use]
    pub fn counters(mut self, counters: Arc<PipelineCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Wire everything.
    ///
    /// # Errors
    /// Invalid configuration, invalid lexicons, or a store that cannot be
    /// opened.
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        let lexicons = match self.lexicons {
            Some(lexicons) => lexicons,
            None => Arc::new(LexiconStore::load(self.config.lexicon.dir.as_deref())?),
        };

        let (log_store, snapshots) = match (self.log_store, self.snapshots) {
            (Some(log), Some(snapshots)) => (log, snapshots),
            (log, snapshots) => {
                let (default_log, default_snapshots) = open_stores(&self.config.persistence)?;
                (log.unwrap_or(default_log), snapshots.unwrap_or(default_snapshots))
            }
        };

        let mut classifier = TopicClassifier::new(Arc::clone(&lexicons), self.config.classifier.clone());
        for (domain, predictor) in self.predictors {
            classifier = classifier.with_predictor(domain, predictor);
        }

        let mut cache = InformationCache::new(Arc::clone(&lexicons), &self.config.cache);
        for (domain, source) in self.sources {
            debug!(domain = %domain, source = source.name(), "Information source registered");
            cache.register(domain, source);
        }

        Ok(Pipeline::new(
            classifier,
            PolicyBook::from_lexicons(&lexicons),
            cache,
            ConversationLog::new(log_store),
            EmotionEngine::new(snapshots, self.config.emotion.clone()),
            self.counters.unwrap_or_default(),
        ))
    }
}

/// Open the configured log and snapshot backends.
///
/// # Errors
/// Unknown backend, or the SQLite file cannot be opened.
pub fn open_stores(config: &PersistenceConfig) -> Result<(Arc<dyn AppendLog>, Arc<dyn SnapshotStore>)> {
    let (log, snapshots): (Arc<dyn AppendLog>, Arc<dyn SnapshotStore>) = match config.backend.as_str() {
        "memory" => (Arc::new(MemoryLog::new()), Arc::new(MemorySnapshots::new())),
        "sqlite" => {
            let store = Arc::new(open_sqlite(&config.path, config)?);
            (store.clone(), store)
        }
        other => return Err(CompanionError::Config(format!("unknown persistence backend '{other}'"))),
    };
    Ok((log, snapshots))
}

fn open_sqlite(path: &Path, config: &PersistenceConfig) -> Result<SqliteStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStore::open(path, config)
}
