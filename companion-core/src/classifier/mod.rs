//! Topic Classifier: hybrid rule + model tagging with personalization.
//!
//! Passes run in order and short-circuit on the first hit:
//!
//! 1. **Rule**: first topic (declaration order) with a keyword contained in
//!    the lower-cased text.
//! 2. **Model**: optional [`LabelPredictor`], label mapped through the
//!    domain's label table; unmapped labels are `other`.
//! 3. **Personalization**: an `other` result becomes the user's strict
//!    topic mode when that mode has been seen often enough.
//!
//! Classification never fails: no match resolves to the domain's `other`.

pub mod predictor;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::lexicon::{DomainConfig, LexiconStore};
use crate::types::{DomainId, ExchangeRecord, Topic};

pub use predictor::{LabelPredictor, NaiveBayesPredictor, Prediction};

/// Which pass produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    /// A lexicon keyword matched.
    Rule,
    /// The statistical predictor supplied a mapped label.
    Model,
    /// `other` was replaced by the user's topic mode.
    Personalized,
    /// Nothing matched.
    Fallback,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rule => "rule",
            Self::Model => "model",
            Self::Personalized => "personalized",
            Self::Fallback => "fallback",
        })
    }
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Resolved topic, always within the requested domain.
    pub topic: Topic,
    /// Pass that produced it.
    pub source: ClassificationSource,
}

impl Classification {
    /// Whether a rule or the model matched a concrete topic.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        matches!(self.source, ClassificationSource::Rule | ClassificationSource::Model)
            && !self.topic.is_other()
    }
}

// ---------------------------------------------------------------------------
// Topic frequency
// ---------------------------------------------------------------------------

/// Per-topic counts of a user's explicitly classified utterances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFrequency {
    counts: BTreeMap<Topic, u32>,
}

impl TopicFrequency {
    /// Count classified turns of `domain` found in a conversation history.
    ///
    /// Only records flagged [`explicit`](ExchangeRecord::explicit) count, so
    /// corrected turns never feed back into the table.
    #[must_use]
    pub fn from_history(domain: DomainId, history: &[ExchangeRecord]) -> Self {
        let mut freq = Self::default();
        for record in history {
            if record.explicit && record.domain() == domain && !record.topic.is_other() {
                freq.record(record.topic);
            }
        }
        freq
    }

    /// Add one observation. `other` is never counted.
    pub fn record(&mut self, topic: Topic) {
        if !topic.is_other() {
            *self.counts.entry(topic).or_insert(0) += 1;
        }
    }

    /// Observations for `topic`.
    #[must_use]
    pub fn count(&self, topic: Topic) -> u32 {
        self.counts.get(&topic).copied().unwrap_or(0)
    }

    /// Total observations.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// The strict mode, if it has at least `min_count` observations.
    /// A tie for the top count yields `None`.
    #[must_use]
    pub fn mode(&self, min_count: u32) -> Option<Topic> {
        let mut best: Option<(Topic, u32)> = None;
        let mut tied = false;
        for (&topic, &count) in &self.counts {
            match best {
                Some((_, top)) if count == top => tied = true,
                Some((_, top)) if count < top => {}
                _ => {
                    best = Some((topic, count));
                    tied = false;
                }
            }
        }
        match best {
            Some((topic, count)) if !tied && count >= min_count => Some(topic),
            _ => None,
        }
    }

    /// Iterate `(topic, count)` pairs in topic order.
    pub fn iter(&self) -> impl Iterator<Item = (Topic, u32)> + '_ {
        self.counts.iter().map(|(t, c)| (*t, *c))
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Hybrid topic classifier shared by every domain.
pub struct TopicClassifier {
    lexicons: Arc<LexiconStore>,
    predictors: HashMap<DomainId, Arc<dyn LabelPredictor>>,
    settings: ClassifierConfig,
    frequencies: Mutex<HashMap<DomainId, TopicFrequency>>,
}

impl fmt::Debug for TopicClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicClassifier")
            .field("predictors", &self.predictors.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TopicClassifier {
    /// Build a classifier. When the model pass is enabled, a
    /// [`NaiveBayesPredictor`] is fitted for every domain whose lexicon
    /// carries training examples.
    #[must_use]
    pub fn new(lexicons: Arc<LexiconStore>, settings: ClassifierConfig) -> Self {
        let mut predictors: HashMap<DomainId, Arc<dyn LabelPredictor>> = HashMap::new();
        if settings.enable_model {
            for config in lexicons.iter() {
                let model = NaiveBayesPredictor::fit(&config.training);
                if model.is_trained() {
                    debug!(domain = %config.domain, labels = model.label_count(), "Predictor fitted");
                    predictors.insert(config.domain, Arc::new(model));
                }
            }
        }
        Self {
            lexicons,
            predictors,
            settings,
            frequencies: Mutex::new(HashMap::new()),
        }
    }

    /// Install (or replace) the predictor for one domain.
    #[must_use]
    pub fn with_predictor(mut self, domain: DomainId, predictor: Arc<dyn LabelPredictor>) -> Self {
        self.predictors.insert(domain, predictor);
        self
    }

    /// Remove the predictor for one domain.
    #[must_use]
    pub fn without_predictor(mut self, domain: DomainId) -> Self {
        self.predictors.remove(&domain);
        self
    }

    /// Whether a model pass is available for `domain`.
    #[must_use]
    pub fn has_predictor(&self, domain: DomainId) -> bool {
        self.predictors.contains_key(&domain)
    }

    /// Whether the next [`classify`](Self::classify) call for `domain` will
    /// read `history` to seed its frequency table. Callers can skip loading
    /// history when this is false.
    #[must_use]
    pub fn needs_history(&self, domain: DomainId) -> bool {
        !self.frequencies.lock().contains_key(&domain)
    }

    /// Classify a user utterance.
    ///
    /// Explicit (rule or model, non-`other`) results increment the user's
    /// frequency table for the domain; corrected and fallback results do not.
    pub fn classify(&self, text: &str, domain: DomainId, history: &[ExchangeRecord]) -> Classification {
        let config = self.lexicons.get(domain);
        let explicit = rule_pass(config, text)
            .map(|topic| Classification { topic, source: ClassificationSource::Rule })
            .or_else(|| self.model_pass(config, text));

        let mut frequencies = self.frequencies.lock();
        let freq = frequencies
            .entry(domain)
            .or_insert_with(|| TopicFrequency::from_history(domain, history));

        let result = match explicit {
            Some(found) if !found.topic.is_other() => {
                freq.record(found.topic);
                found
            }
            _ => match freq.mode(self.settings.personalization_min_count) {
                Some(topic) => Classification { topic, source: ClassificationSource::Personalized },
                None => Classification { topic: domain.other(), source: ClassificationSource::Fallback },
            },
        };
        drop(frequencies);

        debug!(domain = %domain, topic = %result.topic, source = %result.source, "Utterance classified");
        result
    }

    /// Convenience wrapper returning only the topic.
    pub fn classify_topic(&self, text: &str, domain: DomainId, history: &[ExchangeRecord]) -> Topic {
        self.classify(text, domain, history).topic
    }

    /// Current frequency table for `domain` (empty if never seeded).
    #[must_use]
    pub fn frequency(&self, domain: DomainId) -> TopicFrequency {
        self.frequencies.lock().get(&domain).cloned().unwrap_or_default()
    }

    /// Forget the frequency table for `domain`; the next call reseeds it.
    pub fn reset_personalization(&self, domain: DomainId) {
        self.frequencies.lock().remove(&domain);
    }

    fn model_pass(&self, config: &DomainConfig, text: &str) -> Option<Classification> {
        let predictor = self.predictors.get(&config.domain)?;
        let prediction = predictor.predict(text)?;
        if prediction.confidence < self.settings.model_min_confidence {
            debug!(
                domain = %config.domain,
                label = %prediction.label,
                confidence = prediction.confidence,
                "Prediction below confidence floor"
            );
            return None;
        }
        Some(Classification {
            topic: config.topic_for_label(&prediction.label),
            source: ClassificationSource::Model,
        })
    }
}

/// First topic in declaration order with a keyword contained in `text`.
fn rule_pass(config: &DomainConfig, text: &str) -> Option<Topic> {
    let lowered = text.to_lowercase();
    config
        .topics
        .iter()
        .find(|entry| entry.keywords.iter().any(|k| lowered.contains(k.as_str())))
        .map(|entry| entry.topic)
}
