//! Safety Policy: risk scoring, tone softening and disclaimers.
//!
//! Every domain gets the same policy, parameterised by its lexicon:
//!   - score: distinct flagged terms found in the text (case-insensitive)
//!   - decide: Block at `block_threshold`, Caution from `caution_threshold`
//!   - soften: declaration-order substitution, every occurrence
//!   - disclaim: attribution line, or the canned disclaimer
//!
//! Pure and stateless. Misconfiguration is rejected when the lexicon loads,
//! never here.

use serde::{Deserialize, Serialize};

use crate::lexicon::{DomainConfig, LexiconStore, Substitution};
use crate::types::{DomainId, InformationItem, SafetyDecision};

/// Risk score and the decision it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Number of distinct flagged terms present.
    pub score: u32,
    /// Threshold decision for `score`.
    pub decision: SafetyDecision,
}

/// The per-domain safety policy.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    domain: DomainId,
    caution_threshold: u32,
    block_threshold: u32,
    flagged: Vec<String>,
    softening: Vec<Substitution>,
    disclaimer: String,
    refusal: String,
}

impl SafetyPolicy {
    /// Build the policy for one validated lexicon.
    #[must_use]
    pub fn new(config: &DomainConfig) -> Self {
        Self {
            domain: config.domain,
            caution_threshold: config.caution_threshold,
            block_threshold: config.block_threshold,
            flagged: config.flagged.clone(),
            softening: config.softening.clone(),
            disclaimer: config.disclaimer.clone(),
            refusal: config.refusal.clone(),
        }
    }

    /// Domain this policy belongs to.
    #[must_use]
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Score `text` and decide.
    #[must_use]
    pub fn evaluate(&self, text: &str) -> Evaluation {
        let score = self.score(text);
        Evaluation {
            score,
            decision: self.decide(score),
        }
    }

    /// Count distinct flagged terms contained in `text`.
    #[must_use]
    pub fn score(&self, text: &str) -> u32 {
        let lowered = text.to_lowercase();
        let hits = self
            .flagged
            .iter()
            .filter(|term| lowered.contains(term.as_str()))
            .count();
        u32::try_from(hits).unwrap_or(u32::MAX)
    }

    /// Map a score onto the domain's thresholds.
    #[must_use]
    pub fn decide(&self, score: u32) -> SafetyDecision {
        if score >= self.block_threshold {
            SafetyDecision::Block
        } else if score >= self.caution_threshold {
            SafetyDecision::Caution
        } else {
            SafetyDecision::Allow
        }
    }

    /// Apply the softening table in declaration order.
    #[must_use]
    pub fn soften(&self, text: &str) -> String {
        self.softening
            .iter()
            .fold(text.to_string(), |acc, sub| acc.replace(&sub.from, &sub.to))
    }

    /// `"Source: {source}"` for a non-empty source, else the canned disclaimer.
    #[must_use]
    pub fn disclaim(&self, source: Option<&str>) -> String {
        match source.map(str::trim) {
            Some(source) if !source.is_empty() => format!("Source: {source}"),
            _ => self.disclaimer.clone(),
        }
    }

    /// The refusal on Block, the softened text otherwise.
    #[must_use]
    pub fn reply(&self, original: &str, decision: SafetyDecision) -> String {
        match decision {
            SafetyDecision::Block => self.refusal.clone(),
            SafetyDecision::Caution | SafetyDecision::Allow => self.soften(original),
        }
    }

    /// The fixed refusal message.
    #[must_use]
    pub fn refusal(&self) -> &str {
        &self.refusal
    }

    /// Whether an item carries an attribution and may be shown.
    #[must_use]
    pub fn admit(item: &InformationItem) -> bool {
        !item.source.trim().is_empty()
    }

    /// Drop every unattributed item.
    #[must_use]
    pub fn attributed(items: Vec<InformationItem>) -> Vec<InformationItem> {
        items.into_iter().filter(Self::admit).collect()
    }

    /// Compose the user-facing text for one item: disclaimer first, softened
    /// snippet, attribution last. On Block this is the refusal verbatim.
    #[must_use]
    pub fn compose(&self, item: &InformationItem, decision: SafetyDecision) -> String {
        if decision == SafetyDecision::Block {
            return self.refusal.clone();
        }
        let body = self.reply(&format!("{}: {}", item.title, item.summary), decision);
        format!(
            "{}\n{}\n{}",
            self.disclaim(None),
            body,
            self.disclaim(Some(&item.source))
        )
    }
}

/// One [`SafetyPolicy`] per domain.
#[derive(Debug, Clone)]
pub struct PolicyBook {
    /// Indexed by `DomainId as usize`.
    policies: Vec<SafetyPolicy>,
}

impl PolicyBook {
    /// Build every domain's policy from the lexicon store.
    #[must_use]
    pub fn from_lexicons(lexicons: &LexiconStore) -> Self {
        Self {
            policies: lexicons.iter().map(SafetyPolicy::new).collect(),
        }
    }

    /// Policy for `domain`.
    #[must_use]
    pub fn get(&self, domain: DomainId) -> &SafetyPolicy {
        &self.policies[domain as usize]
    }
}
