//! Statistical label predictors for the classifier's model pass.
//!
//! The classifier only sees the [`LabelPredictor`] capability. The shipped
//! implementation is a multinomial naive Bayes model over character bigrams,
//! which needs no tokenizer and so works the same for Japanese and English.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::lexicon::TrainingExample;

/// Top label produced by a predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Model label, mapped to a topic by the domain's label table.
    pub label: String,
    /// Posterior probability of `label` in `[0, 1]`.
    pub confidence: f32,
}

/// An optional model capability consulted when no rule keyword matched.
pub trait LabelPredictor: Send + Sync {
    /// Predict the most likely label, or `None` if the model has nothing to say.
    fn predict(&self, text: &str) -> Option<Prediction>;
}

// ---------------------------------------------------------------------------
// Naive Bayes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct LabelStats {
    documents: u32,
    tokens: u32,
    counts: HashMap<String, u32>,
}

/// Multinomial naive Bayes over character bigrams with Laplace smoothing.
#[derive(Debug, Default, Clone)]
pub struct NaiveBayesPredictor {
    /// Ordered for deterministic tie-breaks.
    labels: BTreeMap<String, LabelStats>,
    vocabulary: HashSet<String>,
    documents: u32,
}

impl NaiveBayesPredictor {
    /// Fit a model from labelled examples.
    #[must_use]
    pub fn fit(examples: &[TrainingExample]) -> Self {
        let mut model = Self::default();
        for example in examples {
            model.observe(&example.label, &example.text);
        }
        model
    }

    /// Add one labelled example.
    pub fn observe(&mut self, label: &str, text: &str) {
        let features = features(text);
        if features.is_empty() {
            return;
        }
        let stats = self.labels.entry(label.to_string()).or_default();
        stats.documents += 1;
        for feature in features {
            stats.tokens += 1;
            *stats.counts.entry(feature.clone()).or_insert(0) += 1;
            self.vocabulary.insert(feature);
        }
        self.documents += 1;
    }

    /// Whether any example has been observed.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.documents > 0
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

impl LabelPredictor for NaiveBayesPredictor {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn predict(&self, text: &str) -> Option<Prediction> {
        if !self.is_trained() {
            return None;
        }
        // Bigrams never seen in training carry no evidence for any label.
        let known: Vec<String> = features(text)
            .into_iter()
            .filter(|f| self.vocabulary.contains(f))
            .collect();
        if known.is_empty() {
            return None;
        }

        let vocab = self.vocabulary.len() as f64;
        let total_docs = f64::from(self.documents);
        let scores: Vec<(&String, f64)> = self
            .labels
            .iter()
            .map(|(label, stats)| {
                let prior = (f64::from(stats.documents) / total_docs).ln();
                let denom = f64::from(stats.tokens) + vocab;
                let likelihood: f64 = known
                    .iter()
                    .map(|f| {
                        let count = stats.counts.get(f).copied().unwrap_or(0);
                        ((f64::from(count) + 1.0) / denom).ln()
                    })
                    .sum();
                (label, prior + likelihood)
            })
            .collect();

        // Strictly greater keeps the first label in order on ties.
        let mut best: Option<(&String, f64)> = None;
        for &(label, score) in &scores {
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((label, score));
            }
        }
        let (best_label, best_score) = best?;

        let normaliser: f64 = scores.iter().map(|(_, s)| (s - best_score).exp()).sum();
        Some(Prediction {
            label: best_label.clone(),
            confidence: (1.0 / normaliser) as f32,
        })
    }
}

/// Lower-cased character bigrams, whitespace removed. A single character
/// yields itself.
fn features(text: &str) -> Vec<String> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    match chars.len() {
        0 => Vec::new(),
        1 => vec![chars[0].to_string()],
        _ => chars.windows(2).map(|w| w.iter().collect()).collect(),
    }
}
