//! Lexicon Store: per-domain keyword, flagged-term and softening tables.
//!
//! Lexicons are static data. The built-in set is embedded from
//! `lexicons/*.toml`; a directory of documents in the same format may
//! override individual domains at startup. Every document is validated when
//! it is loaded, so a malformed table fails the process at boot instead of
//! misbehaving per utterance.
//!
//! ```toml
//! domain = "nutrition"
//! cache_ttl_secs = 21600
//! caution_threshold = 2
//! block_threshold = 3
//! disclaimer = "..."
//! refusal = "..."
//! flagged = ["飲むだけで痩せる", "..."]
//!
//! [labels]
//! supplement_q = "supplement"
//!
//! [[topics]]
//! topic = "supplement"
//! keywords = ["サプリ", "supplement"]
//!
//! [[softening]]
//! from = "絶対"
//! to = "多くの場合"
//!
//! [[training]]
//! label = "supplement_q"
//! text = "マルチビタミンのサプリは飲んだ方がいい？"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CompanionError, Result};
use crate::types::{DomainId, Topic};

/// Built-in lexicon documents, one per [`DomainId`].
const BUILTIN: &[(&str, &str)] = &[
    ("medical.toml", include_str!("../lexicons/medical.toml")),
    ("legal.toml", include_str!("../lexicons/legal.toml")),
    ("economics.toml", include_str!("../lexicons/economics.toml")),
    ("certification.toml", include_str!("../lexicons/certification.toml")),
    ("nutrition.toml", include_str!("../lexicons/nutrition.toml")),
    ("science.toml", include_str!("../lexicons/science.toml")),
    ("astronomy.toml", include_str!("../lexicons/astronomy.toml")),
    ("news.toml", include_str!("../lexicons/news.toml")),
    ("psychology.toml", include_str!("../lexicons/psychology.toml")),
    ("finance.toml", include_str!("../lexicons/finance.toml")),
    ("history.toml", include_str!("../lexicons/history.toml")),
    ("technology.toml", include_str!("../lexicons/technology.toml")),
];

// ---------------------------------------------------------------------------
// Validated tables
// ---------------------------------------------------------------------------

/// Keywords that select one topic during the rule pass.
#[derive(Debug, Clone)]
pub struct TopicKeywords {
    /// Topic selected when any keyword matches.
    pub topic: Topic,
    /// Lower-cased keywords.
    pub keywords: Vec<String>,
}

/// One tone-softening substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Text to replace.
    pub from: String,
    /// Replacement.
    pub to: String,
}

/// A labelled example used to fit the statistical predictor.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingExample {
    /// Model label (mapped to a topic through [`DomainConfig::labels`]).
    pub label: String,
    /// Example utterance.
    pub text: String,
}

/// Everything the pipeline needs to know about one domain.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    /// Which domain this configures.
    pub domain: DomainId,
    /// Information cache time-to-live.
    pub cache_ttl: Duration,
    /// Scores at or above this are at least [`Caution`](crate::SafetyDecision::Caution).
    pub caution_threshold: u32,
    /// Scores at or above this are [`Block`](crate::SafetyDecision::Block).
    pub block_threshold: u32,
    /// Canned "consult an official source" string.
    pub disclaimer: String,
    /// Fixed refusal message for blocked utterances.
    pub refusal: String,
    /// Distinct lower-cased flagged terms.
    pub flagged: Vec<String>,
    /// Rule-pass table in declaration order.
    pub topics: Vec<TopicKeywords>,
    /// Softening table in declaration order.
    pub softening: Vec<Substitution>,
    /// Model label → topic.
    pub labels: HashMap<String, Topic>,
    /// Predictor training examples.
    pub training: Vec<TrainingExample>,
}

impl DomainConfig {
    /// Parse and validate one lexicon document.
    ///
    /// `origin` names the document in error messages.
    ///
    /// # Errors
    /// Returns [`CompanionError::Lexicon`] if the document is malformed or
    /// violates a table invariant.
    pub fn from_toml(origin: &str, toml_str: &str) -> Result<Self> {
        let raw: RawLexicon =
            toml::from_str(toml_str).map_err(|e| CompanionError::lexicon(origin, e.to_string()))?;
        raw.validate(origin)
    }

    /// Map a model label to a topic; unmapped labels become `other`.
    #[must_use]
    pub fn topic_for_label(&self, label: &str) -> Topic {
        self.labels
            .get(label)
            .copied()
            .unwrap_or_else(|| self.domain.other())
    }
}

// ---------------------------------------------------------------------------
// Raw documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLexicon {
    domain: String,
    #[serde(default = "default_ttl_secs")]
    cache_ttl_secs: u64,
    #[serde(default = "default_caution")]
    caution_threshold: u32,
    #[serde(default = "default_block")]
    block_threshold: u32,
    #[serde(default)]
    disclaimer: String,
    #[serde(default)]
    refusal: String,
    #[serde(default)]
    flagged: Vec<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    topics: Vec<RawTopic>,
    #[serde(default)]
    softening: Vec<RawSubstitution>,
    #[serde(default)]
    training: Vec<TrainingExample>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopic {
    topic: String,
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSubstitution {
    from: String,
    to: String,
}

impl RawLexicon {
    fn validate(self, origin: &str) -> Result<DomainConfig> {
        let domain = DomainId::from_id(self.domain.trim())
            .ok_or_else(|| CompanionError::lexicon(origin, format!("unknown domain '{}'", self.domain)))?;
        let fail = |reason: String| CompanionError::lexicon(domain.id(), reason);

        if self.block_threshold == 0 {
            return Err(fail("block_threshold must be at least 1".into()));
        }
        if self.caution_threshold >= self.block_threshold {
            return Err(fail(format!(
                "caution_threshold ({}) must be below block_threshold ({})",
                self.caution_threshold, self.block_threshold
            )));
        }
        if self.disclaimer.trim().is_empty() {
            return Err(fail("disclaimer is missing".into()));
        }
        if self.refusal.trim().is_empty() {
            return Err(fail("refusal is missing".into()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(fail("cache_ttl_secs must be positive".into()));
        }

        let mut flagged: Vec<String> = Vec::with_capacity(self.flagged.len());
        for term in &self.flagged {
            let term = term.trim().to_lowercase();
            if term.is_empty() {
                return Err(fail("flagged term is empty".into()));
            }
            if !flagged.contains(&term) {
                flagged.push(term);
            }
        }

        let mut topics = Vec::with_capacity(self.topics.len());
        for raw in self.topics {
            let topic = domain
                .topic(&raw.topic)
                .ok_or_else(|| fail(format!("unknown topic '{}'", raw.topic)))?;
            if topic.is_other() {
                return Err(fail("'other' is the fallback and cannot carry keywords".into()));
            }
            let keywords: Vec<String> = raw
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(fail(format!("topic '{}' has no keywords", raw.topic)));
            }
            topics.push(TopicKeywords { topic, keywords });
        }

        let softening: Vec<Substitution> = self
            .softening
            .into_iter()
            .map(|s| Substitution { from: s.from, to: s.to })
            .collect();
        check_softening_keys(&softening).map_err(fail)?;

        let mut labels = HashMap::with_capacity(self.labels.len());
        for (label, tag) in self.labels {
            let topic = domain
                .topic(&tag)
                .ok_or_else(|| fail(format!("label '{label}' maps to unknown topic '{tag}'")))?;
            labels.insert(label, topic);
        }

        debug!(
            domain = %domain,
            topics = topics.len(),
            flagged = flagged.len(),
            softening = softening.len(),
            training = self.training.len(),
            "Lexicon validated"
        );

        Ok(DomainConfig {
            domain,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            caution_threshold: self.caution_threshold,
            block_threshold: self.block_threshold,
            disclaimer: self.disclaimer,
            refusal: self.refusal,
            flagged,
            topics,
            softening,
            labels,
            training: self.training,
        })
    }
}

/// Reject empty keys and keys that contain one another.
///
/// Substitutions run in declaration order, so a key nested inside another
/// would rewrite part of the longer phrase before it could match.
fn check_softening_keys(table: &[Substitution]) -> std::result::Result<(), String> {
    for (i, a) in table.iter().enumerate() {
        if a.from.is_empty() {
            return Err("softening key is empty".into());
        }
        for b in table.iter().skip(i + 1) {
            if a.from.contains(&b.from) || b.from.contains(&a.from) {
                return Err(format!(
                    "softening keys '{}' and '{}' overlap",
                    a.from, b.from
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The full set of validated domain lexicons, one per [`DomainId`].
#[derive(Debug, Clone)]
pub struct LexiconStore {
    /// Indexed by `DomainId as usize`.
    domains: Vec<DomainConfig>,
}

impl LexiconStore {
    /// Load the embedded built-in lexicons.
    ///
    /// # Errors
    /// Returns [`CompanionError::Lexicon`] if a built-in document is invalid.
    pub fn builtin() -> Result<Self> {
        Self::from_documents(BUILTIN.iter().copied())
    }

    /// Build a store from `(origin, toml)` documents. Every built-in domain
    /// must be covered; a later document for the same domain replaces an
    /// earlier one.
    ///
    /// # Errors
    /// Returns [`CompanionError::Lexicon`] on invalid documents or missing domains.
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut by_domain: HashMap<DomainId, DomainConfig> = HashMap::new();
        for (origin, text) in docs {
            let config = DomainConfig::from_toml(origin, text)?;
            by_domain.insert(config.domain, config);
        }
        Self::assemble(by_domain)
    }

    /// Load the built-ins, then let every `*.toml` in `dir` override the
    /// domain it declares.
    ///
    /// # Errors
    /// Returns an I/O error if the directory cannot be read, or
    /// [`CompanionError::Lexicon`] if any document is invalid.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut by_domain: HashMap<DomainId, DomainConfig> = HashMap::new();
        for (origin, text) in BUILTIN {
            let config = DomainConfig::from_toml(origin, text)?;
            by_domain.insert(config.domain, config);
        }

        if let Some(dir) = dir {
            let mut paths: Vec<_> = std::fs::read_dir(dir)?
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            paths.sort();
            for path in paths {
                let text = std::fs::read_to_string(&path)?;
                let config = DomainConfig::from_toml(&path.display().to_string(), &text)?;
                info!(domain = %config.domain, path = %path.display(), "Lexicon override loaded");
                by_domain.insert(config.domain, config);
            }
        }

        Self::assemble(by_domain)
    }

    fn assemble(mut by_domain: HashMap<DomainId, DomainConfig>) -> Result<Self> {
        let mut domains = Vec::with_capacity(DomainId::ALL.len());
        for domain in DomainId::ALL {
            let config = by_domain
                .remove(domain)
                .ok_or_else(|| CompanionError::lexicon(domain.id(), "no lexicon declared"))?;
            domains.push(config);
        }
        info!(domains = domains.len(), "Lexicon store ready");
        Ok(Self { domains })
    }

    /// Configuration for one domain.
    #[must_use]
    pub fn get(&self, domain: DomainId) -> &DomainConfig {
        &self.domains[domain as usize]
    }

    /// All domain configurations in [`DomainId::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainConfig> {
        self.domains.iter()
    }
}

fn default_ttl_secs() -> u64 { 3600 }
fn default_caution() -> u32 { 2 }
fn default_block() -> u32 { 3 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CertificationTopic, NutritionTopic};

    const MINIMAL: &str = r#"
        domain = "nutrition"
        disclaimer = "公的な情報源も確認してください。"
        refusal = "その質問にはお答えできません。"
        flagged = ["飲むだけで痩せる", "飲むだけで痩せる", "必ず治る"]

        [[topics]]
        topic = "supplement"
        keywords = ["サプリ", "Supplement"]
    "#;

    #[test]
    fn builtin_covers_every_domain() {
        let store = LexiconStore::builtin().expect("builtin lexicons are valid");
        for domain in DomainId::ALL {
            let config = store.get(*domain);
            assert_eq!(config.domain, *domain);
            assert!(!config.topics.is_empty(), "{domain} has no rule table");
            assert!(!config.flagged.is_empty(), "{domain} has no flagged terms");
        }
    }

    #[test]
    fn defaults_and_normalisation() {
        let config = DomainConfig::from_toml("test", MINIMAL).expect("valid");
        assert_eq!(config.caution_threshold, 2);
        assert_eq!(config.block_threshold, 3);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.flagged.len(), 2, "duplicates collapse");
        assert_eq!(config.topics[0].keywords[1], "supplement");
        assert_eq!(config.topics[0].topic, Topic::Nutrition(NutritionTopic::Supplement));
    }

    #[test]
    fn rejects_unknown_topic() {
        let doc = MINIMAL.replace("topic = \"supplement\"", "topic = \"domesticIT\"");
        let err = DomainConfig::from_toml("test", &doc).expect_err("must fail");
        assert!(err.to_string().contains("unknown topic"));
    }

    #[test]
    fn rejects_missing_disclaimer() {
        let doc = MINIMAL.replace("disclaimer = \"公的な情報源も確認してください。\"", "");
        assert!(DomainConfig::from_toml("test", &doc).is_err());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let doc = format!("caution_threshold = 3\nblock_threshold = 3\n{MINIMAL}");
        let err = DomainConfig::from_toml("test", &doc).expect_err("must fail");
        assert!(err.to_string().contains("caution_threshold"));
    }

    #[test]
    fn rejects_overlapping_softening_keys() {
        let doc = format!(
            "{MINIMAL}\n[[softening]]\nfrom = \"絶対\"\nto = \"おそらく\"\n\n[[softening]]\nfrom = \"絶対に\"\nto = \"たぶん\"\n"
        );
        let err = DomainConfig::from_toml("test", &doc).expect_err("must fail");
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn rejects_unknown_domain() {
        let doc = MINIMAL.replace("\"nutrition\"", "\"astrology\"");
        assert!(DomainConfig::from_toml("test", &doc).is_err());
    }

    #[test]
    fn missing_domain_fails_store_assembly() {
        let err = LexiconStore::from_documents([("nutrition.toml", MINIMAL)]).expect_err("incomplete");
        assert!(matches!(err, CompanionError::Lexicon { .. }));
    }

    #[test]
    fn unmapped_label_is_other() {
        let store = LexiconStore::builtin().expect("builtin");
        let config = store.get(DomainId::Certification);
        assert_eq!(
            config.topic_for_label("no-such-label"),
            Topic::Certification(CertificationTopic::Other)
        );
    }

    #[test]
    fn directory_override_replaces_domain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = MINIMAL.replace("サプリ", "タブレット");
        std::fs::write(dir.path().join("nutrition.toml"), doc).expect("write");
        std::fs::write(dir.path().join("README.md"), "ignored").expect("write");

        let store = LexiconStore::load(Some(dir.path())).expect("load");
        let nutrition = store.get(DomainId::Nutrition);
        assert_eq!(nutrition.topics.len(), 1);
        assert_eq!(nutrition.topics[0].keywords[0], "タブレット");
        // Other domains keep the built-in tables.
        assert!(store.get(DomainId::Medical).topics.len() > 1);
    }
}
