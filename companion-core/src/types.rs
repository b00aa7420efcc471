//! Core type definitions for the companion pipeline.
//!
//! Domains and topics are closed sum types: adding a topic is a
//! compile-time-checked change, and every domain carries an explicit
//! `Other` fallback. Lexicon files refer to topics by their camelCase tag and
//! are rejected at load time when a tag does not exist.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Topic sets
// ---------------------------------------------------------------------------

/// Declare a per-domain topic enum with a trailing `Other` variant.
macro_rules! topic_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $tag:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Nothing in the domain matched.
            Other,
        }

        impl $name {
            /// Every topic in declaration order, `Other` last.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+ Self::Other];

            /// Stable camelCase tag used by lexicons and storage.
            #[must_use]
            pub fn tag(self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                    Self::Other => "other",
                }
            }

            /// Parse a tag back into a topic.
            #[must_use]
            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(Self::$variant),)+
                    "other" => Some(Self::Other),
                    _ => None,
                }
            }
        }
    };
}

/// Declare [`DomainId`] and the umbrella [`Topic`] enum from the topic sets.
macro_rules! domains {
    ( $( $(#[$vmeta:meta])* $variant:ident($topics:ident) => $id:literal, )+ ) => {
        /// Identifier of a knowledge domain.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum DomainId {
            $( $(#[$vmeta])* $variant, )+
        }

        impl DomainId {
            /// Every built-in domain.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Lower-case id used in lexicon files and on the wire.
            #[must_use]
            pub fn id(self) -> &'static str {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            /// Look a domain up by id.
            #[must_use]
            pub fn from_id(id: &str) -> Option<Self> {
                match id {
                    $($id => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The domain's mandatory fallback topic.
            #[must_use]
            pub fn other(self) -> Topic {
                match self {
                    $(Self::$variant => Topic::$variant($topics::Other),)+
                }
            }

            /// The domain's closed topic set, `other` last.
            #[must_use]
            pub fn topics(self) -> Vec<Topic> {
                match self {
                    $(Self::$variant => $topics::ALL.iter().copied().map(Topic::$variant).collect(),)+
                }
            }

            /// Resolve a camelCase tag within this domain.
            #[must_use]
            pub fn topic(self, tag: &str) -> Option<Topic> {
                match self {
                    $(Self::$variant => $topics::from_tag(tag).map(Topic::$variant),)+
                }
            }
        }

        /// A topic tag scoped to its domain.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Topic {
            $( $(#[$vmeta])* $variant($topics), )+
        }

        impl Topic {
            /// Domain this topic belongs to.
            #[must_use]
            pub fn domain(self) -> DomainId {
                match self {
                    $(Self::$variant(_) => DomainId::$variant,)+
                }
            }

            /// camelCase tag without the domain prefix.
            #[must_use]
            pub fn tag(self) -> &'static str {
                match self {
                    $(Self::$variant(t) => t.tag(),)+
                }
            }

            /// Whether this is the domain's `other` fallback.
            #[must_use]
            pub fn is_other(self) -> bool {
                match self {
                    $(Self::$variant(t) => t == $topics::Other,)+
                }
            }
        }
    };
}

topic_set! {
    /// Medical topics.
    MedicalTopic {
        /// Internal medicine.
        InternalMed => "internalMed",
        /// Surgery.
        Surgery => "surgery",
        /// Drugs and prescriptions.
        Pharmacology => "pharmacology",
        /// Children's health.
        Pediatrics => "pediatrics",
        /// Skin.
        Dermatology => "dermatology",
        /// Mental health.
        MentalHealth => "mentalHealth",
    }
}

topic_set! {
    /// Legal topics.
    LegalTopic {
        /// Contracts.
        Contract => "contract",
        /// Employment law.
        Labor => "labor",
        /// Marriage, divorce, custody.
        Family => "family",
        /// Criminal law.
        Criminal => "criminal",
        /// Property and leases.
        RealEstate => "realEstate",
        /// Wills and inheritance.
        Inheritance => "inheritance",
    }
}

topic_set! {
    /// Economics topics.
    EconomicsTopic {
        /// GDP, inflation, business cycles.
        Macro => "macroeconomy",
        /// Stock and bond markets.
        Markets => "markets",
        /// Central banks and interest rates.
        MonetaryPolicy => "monetaryPolicy",
        /// Trade and exchange rates.
        Trade => "trade",
        /// Jobs and wages.
        Employment => "employment",
    }
}

topic_set! {
    /// Certification exam topics.
    CertificationTopic {
        /// Japanese national IT exams.
        DomesticIt => "domesticIT",
        /// Vendor / international IT certifications.
        InternationalIt => "internationalIT",
        /// Language proficiency tests.
        Language => "language",
        /// Bookkeeping and accounting.
        Accounting => "accounting",
        /// Real-estate transaction licence.
        RealEstateLicense => "realEstateLicense",
        /// Healthcare and welfare licences.
        HealthcareLicense => "healthcareLicense",
    }
}

topic_set! {
    /// Nutrition topics.
    NutritionTopic {
        /// Supplements.
        Supplement => "supplement",
        /// Diets and weight control.
        Diet => "diet",
        /// Vitamins and minerals.
        Vitamins => "vitamins",
        /// Food allergies.
        Allergy => "allergy",
        /// Nutrition for athletes.
        SportsNutrition => "sportsNutrition",
    }
}

topic_set! {
    /// Natural science topics.
    ScienceTopic {
        /// Physics.
        Physics => "physics",
        /// Chemistry.
        Chemistry => "chemistry",
        /// Biology.
        Biology => "biology",
        /// Geology, climate, oceans.
        EarthScience => "earthScience",
    }
}

topic_set! {
    /// Astronomy topics.
    AstronomyTopic {
        /// Solar-system bodies.
        Planets => "planets",
        /// Stars and galaxies.
        Stars => "stars",
        /// Cosmology.
        Cosmology => "cosmology",
        /// Launches and probes.
        SpaceMissions => "spaceMissions",
    }
}

topic_set! {
    /// General news topics.
    NewsTopic {
        /// Politics.
        Politics => "politics",
        /// Business.
        Business => "business",
        /// Sports.
        Sports => "sports",
        /// Entertainment.
        Entertainment => "entertainment",
        /// Weather.
        Weather => "weather",
    }
}

topic_set! {
    /// Psychology topics.
    PsychologyTopic {
        /// Stress and anxiety.
        Stress => "stress",
        /// Sleep.
        Sleep => "sleep",
        /// Relationships.
        Relationships => "relationships",
        /// Motivation and habits.
        Motivation => "motivation",
    }
}

topic_set! {
    /// Personal finance topics.
    FinanceTopic {
        /// Saving and budgeting.
        Savings => "savings",
        /// Investing.
        Investment => "investment",
        /// Taxes.
        Tax => "tax",
        /// Insurance.
        Insurance => "insurance",
        /// Pensions.
        Pension => "pension",
    }
}

topic_set! {
    /// History topics.
    HistoryTopic {
        /// Antiquity.
        Ancient => "ancient",
        /// Middle ages.
        Medieval => "medieval",
        /// Modern history.
        Modern => "modern",
        /// Japanese history.
        JapaneseHistory => "japaneseHistory",
    }
}

topic_set! {
    /// Technology topics.
    TechnologyTopic {
        /// Artificial intelligence.
        Ai => "ai",
        /// Programming.
        Programming => "programming",
        /// Information security.
        Security => "security",
        /// Devices.
        Gadgets => "gadgets",
    }
}

domains! {
    /// Medicine.
    Medical(MedicalTopic) => "medical",
    /// Law.
    Legal(LegalTopic) => "legal",
    /// Economics.
    Economics(EconomicsTopic) => "economics",
    /// Certification exams.
    Certification(CertificationTopic) => "certification",
    /// Nutrition.
    Nutrition(NutritionTopic) => "nutrition",
    /// Natural science.
    Science(ScienceTopic) => "science",
    /// Astronomy.
    Astronomy(AstronomyTopic) => "astronomy",
    /// General news.
    News(NewsTopic) => "news",
    /// Psychology.
    Psychology(PsychologyTopic) => "psychology",
    /// Personal finance.
    Finance(FinanceTopic) => "finance",
    /// History.
    History(HistoryTopic) => "history",
    /// Technology.
    Technology(TechnologyTopic) => "technology",
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DomainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s.trim()).ok_or_else(|| format!("unknown domain '{s}'"))
    }
}

impl Serialize for DomainId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for DomainId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain(), self.tag())
    }
}

impl FromStr for Topic {
    type Err = String;

    /// Parse the `"<domain>/<tag>"` wire form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, tag) = s
            .split_once('/')
            .ok_or_else(|| format!("topic '{s}' is not of the form domain/tag"))?;
        let domain: DomainId = domain.parse()?;
        domain
            .topic(tag)
            .ok_or_else(|| format!("unknown topic '{tag}' in domain '{domain}'"))
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier for a conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Create a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Who produced an exchange record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human.
    User,
    /// The companion.
    Companion,
}

impl Speaker {
    /// Lower-case tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Companion => "companion",
        }
    }

    /// Parse a lower-case tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "user" => Some(Self::User),
            "companion" => Some(Self::Companion),
            _ => None,
        }
    }
}

/// Discrete emotion tag attached to exchanges and fed to the growth engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    /// Cheerful.
    Happy,
    /// Cheering the user on.
    Encouraging,
    /// Soft and careful.
    Gentle,
    /// Sad or sympathetic.
    Sad,
    /// Angry.
    Angry,
    /// Surprised.
    Surprised,
    /// Pondering.
    Thinking,
    /// Placeholder / no particular emotion.
    Neutral,
}

impl Emotion {
    /// Every emotion tag.
    pub const ALL: &'static [Self] = &[
        Self::Happy,
        Self::Encouraging,
        Self::Gentle,
        Self::Sad,
        Self::Angry,
        Self::Surprised,
        Self::Thinking,
        Self::Neutral,
    ];

    /// Lower-case tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Encouraging => "encouraging",
            Self::Gentle => "gentle",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Thinking => "thinking",
            Self::Neutral => "neutral",
        }
    }

    /// Parse a tag; unknown tags map to [`Emotion::Neutral`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.tag().eq_ignore_ascii_case(tag.trim()))
            .unwrap_or(Self::Neutral)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One immutable line of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// Who said it.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
    /// Emotion tag attached to the turn.
    pub emotion: Emotion,
    /// Topic tag (domain-scoped).
    pub topic: Topic,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
    /// Set on companion records whose topic came from a rule or model match.
    /// Corrected and fallback topics leave it unset.
    #[serde(default)]
    pub explicit: bool,
}

impl ExchangeRecord {
    /// Create a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>, emotion: Emotion, topic: Topic) -> Self {
        Self {
            id: RecordId::new(),
            speaker,
            text: text.into(),
            emotion,
            topic,
            timestamp: Utc::now(),
            explicit: false,
        }
    }

    /// Mark whether the topic was matched explicitly.
    #[must_use]
    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    /// Domain of the record's topic.
    #[must_use]
    pub fn domain(&self) -> DomainId {
        self.topic.domain()
    }
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

/// Outcome of a safety evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyDecision {
    /// Answer normally.
    Allow,
    /// Answer, softened.
    Caution,
    /// Refuse with the fixed message.
    Block,
}

impl fmt::Display for SafetyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Caution => "caution",
            Self::Block => "block",
        })
    }
}

// ---------------------------------------------------------------------------
// Information
// ---------------------------------------------------------------------------

/// A retrieved snippet of domain information.
///
/// Items with an empty `source` are never shown; the safety policy drops
/// them before composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationItem {
    /// Headline.
    pub title: String,
    /// Short body text.
    pub summary: String,
    /// Attribution.
    pub source: String,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Topic the item was fetched for.
    pub topic: Topic,
}

// ---------------------------------------------------------------------------
// Emotion state
// ---------------------------------------------------------------------------

/// Five-axis affect accumulator plus the derived growth level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionState {
    /// Accumulated joy (≥ 0).
    pub joy: f32,
    /// Accumulated sadness (≥ 0).
    pub sadness: f32,
    /// Accumulated anger (≥ 0).
    pub anger: f32,
    /// Accumulated surprise (≥ 0).
    pub surprise: f32,
    /// Accumulated trust (≥ 0).
    pub trust: f32,
    /// Discrete growth level (≥ 1, never decreases).
    pub growth_level: u32,
}

impl EmotionState {
    /// The zero state at growth level 1.
    pub const INITIAL: Self = Self {
        joy: 0.0,
        sadness: 0.0,
        anger: 0.0,
        surprise: 0.0,
        trust: 0.0,
        growth_level: 1,
    };
}

impl Default for EmotionState {
    fn default() -> Self {
        Self::INITIAL
    }
}
