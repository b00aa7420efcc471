//! Configuration for the companion pipeline.
//!
//! Maps directly to `companion.toml`. Every section is optional; missing
//! keys fall back to the defaults below. Per-domain tables (keywords,
//! thresholds, TTLs, canned strings) are not here: they live in the
//! lexicon documents, see [`crate::lexicon`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::DomainId;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompanionConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Topic classifier tuning.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Information cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Log and snapshot storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Lexicon overrides.
    #[serde(default)]
    pub lexicon: LexiconConfig,
    /// Emotion/growth tuning.
    #[serde(default)]
    pub emotion: EmotionConfig,
    /// Backing information feeds, keyed by domain id.
    #[serde(default)]
    pub feeds: BTreeMap<DomainId, FeedConfig>,
}

impl CompanionConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CompanionError::Config` if the TOML is invalid or a value is
    /// out of range.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::CompanionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `CompanionError::Config` describing the first bad value.
    pub fn validate(&self) -> crate::error::Result<()> {
        let bad = |msg: &str| Err(crate::CompanionError::Config(msg.to_string()));
        if self.cache.max_entries == 0 {
            return bad("cache.max_entries must be positive");
        }
        if self.cache.fetch_timeout_ms == 0 {
            return bad("cache.fetch_timeout_ms must be positive");
        }
        if !(self.emotion.growth_step.is_finite() && self.emotion.growth_step > 0.0) {
            return bad("emotion.growth_step must be positive and finite");
        }
        if !(self.emotion.anger_weight.is_finite() && self.emotion.anger_weight >= 0.0) {
            return bad("emotion.anger_weight must be finite and not negative");
        }
        for (name, words) in self.emotion.cues.lists() {
            if words.iter().any(|w| w.trim().is_empty()) {
                return Err(crate::CompanionError::Config(format!(
                    "emotion.cues.{name} contains an empty cue"
                )));
            }
        }
        if self.classifier.personalization_min_count == 0 {
            return bad("classifier.personalization_min_count must be positive");
        }
        if !matches!(self.persistence.backend.as_str(), "sqlite" | "memory") {
            return bad("persistence.backend must be \"sqlite\" or \"memory\"");
        }
        for (domain, feed) in &self.feeds {
            if feed.url.trim().is_empty() {
                return Err(crate::CompanionError::Config(format!(
                    "feeds.{domain}.url is empty"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Topic classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Fit and use the statistical predictor when a lexicon has training data.
    #[serde(default = "default_true")]
    pub enable_model: bool,
    /// Predictions below this posterior are ignored.
    #[serde(default)]
    pub model_min_confidence: f32,
    /// Minimum count for the personalization mode to replace `other`.
    #[serde(default = "default_5")]
    pub personalization_min_count: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enable_model: true,
            model_min_confidence: 0.0,
            personalization_min_count: 5,
        }
    }
}

/// Information cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on a single backing fetch, after which the fallback is used.
    #[serde(default = "default_5000")]
    pub fetch_timeout_ms: u64,
    /// Maximum number of cached topics (least recently used evicted first).
    #[serde(default = "default_256")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5000,
            max_entries: 256,
        }
    }
}

/// Log and snapshot storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "sqlite" or "memory".
    #[serde(default = "default_sqlite")]
    pub backend: String,
    /// Database file for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a checksum on emotion snapshots.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: PathBuf::from("companion.db"),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Lexicon overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// Directory of `*.toml` lexicons overriding the built-ins.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Emotion/growth tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// Growth threshold per level: level up when total > level × step.
    #[serde(default = "default_growth_step")]
    pub growth_step: f32,
    /// How strongly anger offsets positive affect in the growth total.
    #[serde(default = "default_anger_weight")]
    pub anger_weight: f32,
    /// Cue words that make the companion mirror the user's feeling.
    #[serde(default)]
    pub cues: EmotionCues,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            growth_step: 5.0,
            anger_weight: 0.7,
            cues: EmotionCues::default(),
        }
    }
}

/// Empathic cue words, checked in field order: sad, angry, surprised, happy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionCues {
    /// Cues for [`Emotion::Sad`](crate::Emotion::Sad).
    #[serde(default = "default_sad_cues")]
    pub sad: Vec<String>,
    /// Cues for [`Emotion::Angry`](crate::Emotion::Angry).
    #[serde(default = "default_angry_cues")]
    pub angry: Vec<String>,
    /// Cues for [`Emotion::Surprised`](crate::Emotion::Surprised).
    #[serde(default = "default_surprised_cues")]
    pub surprised: Vec<String>,
    /// Cues for [`Emotion::Happy`](crate::Emotion::Happy).
    #[serde(default = "default_happy_cues")]
    pub happy: Vec<String>,
}

impl EmotionCues {
    /// Each cue list with its config key, in match order.
    #[must_use]
    pub fn lists(&self) -> [(&'static str, &[String]); 4] {
        [
            ("sad", &self.sad),
            ("angry", &self.angry),
            ("surprised", &self.surprised),
            ("happy", &self.happy),
        ]
    }
}

impl Default for EmotionCues {
    fn default() -> Self {
        Self {
            sad: default_sad_cues(),
            angry: default_angry_cues(),
            surprised: default_surprised_cues(),
            happy: default_happy_cues(),
        }
    }
}

/// One backing HTTP feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Endpoint; `{topic}` is replaced by the topic tag, otherwise the tag is
    /// sent as the `topic` query parameter.
    pub url: String,
    /// Optional bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_5000")]
    pub timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
fn default_sqlite() -> String { "sqlite".to_string() }
fn default_db_path() -> PathBuf { PathBuf::from("companion.db") }
fn default_growth_step() -> f32 { 5.0 }
fn default_anger_weight() -> f32 { 0.7 }
fn default_2() -> u32 { 2 }
fn default_5() -> u32 { 5 }
fn default_256() -> usize { 256 }
fn default_5000() -> u64 { 5000 }

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_sad_cues() -> Vec<String> {
    strings(&["悲しい", "つらい", "寂しい", "落ち込", "sad", "lonely"])
}
fn default_angry_cues() -> Vec<String> {
    strings(&["ムカつく", "腹が立つ", "許せない", "イライラする", "angry"])
}
fn default_surprised_cues() -> Vec<String> {
    strings(&["びっくり", "驚いた", "まさか", "wow"])
}
fn default_happy_cues() -> Vec<String> {
    strings(&["うれしい", "嬉しい", "楽しい", "ありがとう", "合格した", "thank"])
}
