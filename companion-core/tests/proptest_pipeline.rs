//! Property-Based Tests for the companion pipeline stages.
//!
//! Uses `proptest` to check classifier, safety, log and growth invariants
//! under arbitrary utterances and emotion sequences.

use std::sync::{Arc, LazyLock};

use proptest::prelude::*;

use companion_core::classifier::TopicClassifier;
use companion_core::config::{ClassifierConfig, EmotionConfig};
use companion_core::emotion::{self, growth_total};
use companion_core::lexicon::LexiconStore;
use companion_core::log::LogFilter;
use companion_core::safety::PolicyBook;
use companion_core::{CompanionConfig, DomainId, Emotion, EmotionState, PipelineBuilder, SafetyDecision, Speaker};

static LEXICONS: LazyLock<Arc<LexiconStore>> =
    LazyLock::new(|| Arc::new(LexiconStore::builtin().expect("builtin lexicons")));

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_domain() -> impl Strategy<Value = DomainId> {
    prop::sample::select(DomainId::ALL.to_vec())
}

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    prop::sample::select(Emotion::ALL.to_vec())
}

/// Free text mixed with real keywords and flagged terms so every pass fires.
fn arb_utterance() -> impl Strategy<Value = String> {
    let vocabulary: Vec<String> = LEXICONS
        .iter()
        .flat_map(|c| {
            c.topics
                .iter()
                .flat_map(|t| t.keywords.iter().cloned())
                .chain(c.flagged.iter().cloned())
        })
        .collect();
    prop::collection::vec(
        prop_oneof![
            "\\PC{0,12}",
            prop::sample::select(vocabulary),
        ],
        0..5,
    )
    .prop_map(|parts| parts.concat())
}

fn rank(decision: SafetyDecision) -> u8 {
    match decision {
        SafetyDecision::Allow => 0,
        SafetyDecision::Caution => 1,
        SafetyDecision::Block => 2,
    }
}

// ---------------------------------------------------------------------------
// Property: the conversation log is append-only
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn log_only_grows_at_the_end(
        turns in prop::collection::vec((arb_utterance(), arb_domain()), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let config = CompanionConfig::from_toml("[persistence]\nbackend = \"memory\"\n").expect("config");
        let pipeline = PipelineBuilder::new(config)
            .lexicons(Arc::clone(&LEXICONS))
            .build()
            .expect("pipeline");

        let mut before = pipeline.log().query(&LogFilter::all()).expect("query");
        prop_assert!(before.is_empty());
        for (text, domain) in &turns {
            runtime.block_on(pipeline.handle(text, *domain));
            let after = pipeline.log().query(&LogFilter::all()).expect("query");

            prop_assert_eq!(after.len(), before.len() + 2);
            prop_assert_eq!(&after[..before.len()], &before[..]);
            let (user, companion) = (&after[before.len()], &after[before.len() + 1]);
            prop_assert_eq!(user.speaker, Speaker::User);
            prop_assert_eq!(&user.text, text);
            prop_assert_eq!(companion.speaker, Speaker::Companion);
            prop_assert_eq!(user.domain(), *domain);
            prop_assert_eq!(companion.domain(), *domain);
            before = after;
        }
    }
}

// ---------------------------------------------------------------------------
// Property: classification is total, domain-scoped and deterministic
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn classification_stays_in_domain(text in arb_utterance(), domain in arb_domain()) {
        let classifier = TopicClassifier::new(Arc::clone(&LEXICONS), ClassifierConfig::default());
        let topic = classifier.classify_topic(&text, domain, &[]);
        prop_assert_eq!(topic.domain(), domain);
    }

    #[test]
    fn classification_is_deterministic(text in arb_utterance(), domain in arb_domain()) {
        let a = TopicClassifier::new(Arc::clone(&LEXICONS), ClassifierConfig::default());
        let b = TopicClassifier::new(Arc::clone(&LEXICONS), ClassifierConfig::default());
        prop_assert_eq!(a.classify(&text, domain, &[]), b.classify(&text, domain, &[]));
    }
}

// ---------------------------------------------------------------------------
// Property: risk never decreases when text is added
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn appending_text_never_lowers_risk(
        text in arb_utterance(),
        extra in arb_utterance(),
        domain in arb_domain(),
    ) {
        let book = PolicyBook::from_lexicons(&LEXICONS);
        let policy = book.get(domain);
        let before = policy.evaluate(&text);
        let after = policy.evaluate(&format!("{text}{extra}"));
        prop_assert!(after.score >= before.score);
        prop_assert!(rank(after.decision) >= rank(before.decision));
    }

    #[test]
    fn decision_is_monotonic_in_score(a in 0u32..12, b in 0u32..12, domain in arb_domain()) {
        let book = PolicyBook::from_lexicons(&LEXICONS);
        let policy = book.get(domain);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(policy.decide(lo)) <= rank(policy.decide(hi)));
    }

    #[test]
    fn evaluation_matches_thresholds(text in arb_utterance(), domain in arb_domain()) {
        let config = LEXICONS.get(domain);
        let evaluation = PolicyBook::from_lexicons(&LEXICONS).get(domain).evaluate(&text);
        let expected = if evaluation.score >= config.block_threshold {
            SafetyDecision::Block
        } else if evaluation.score >= config.caution_threshold {
            SafetyDecision::Caution
        } else {
            SafetyDecision::Allow
        };
        prop_assert_eq!(evaluation.decision, expected);
    }
}

// ---------------------------------------------------------------------------
// Property: disclaimers never depend on the reply
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn missing_source_always_yields_the_canned_disclaimer(
        blank in "[ \\t]{0,4}",
        domain in arb_domain(),
    ) {
        let book = PolicyBook::from_lexicons(&LEXICONS);
        let policy = book.get(domain);
        let canned = &LEXICONS.get(domain).disclaimer;
        prop_assert_eq!(&policy.disclaim(None), canned);
        prop_assert_eq!(&policy.disclaim(Some(&blank)), canned);
    }

    #[test]
    fn attribution_line_names_the_source(source in "[a-zA-Z0-9]{1,16}", domain in arb_domain()) {
        let book = PolicyBook::from_lexicons(&LEXICONS);
        prop_assert_eq!(book.get(domain).disclaim(Some(&source)), format!("Source: {source}"));
    }
}

// ---------------------------------------------------------------------------
// Property: growth level never decreases and axes stay non-negative
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn growth_is_monotonic(emotions in prop::collection::vec(arb_emotion(), 0..200)) {
        let config = EmotionConfig::default();
        let mut state = EmotionState::INITIAL;
        for emotion in emotions {
            let before = state;
            let leveled = emotion::apply(&mut state, emotion, config.growth_step, config.anger_weight);
            prop_assert!(state.growth_level >= before.growth_level);
            prop_assert!(state.growth_level <= before.growth_level + 1, "one level per update");
            prop_assert_eq!(leveled, state.growth_level > before.growth_level);
            for v in [state.joy, state.sadness, state.anger, state.surprise, state.trust] {
                prop_assert!(v >= 0.0);
            }
        }
    }

    #[test]
    fn leveling_requires_crossing_the_threshold(emotions in prop::collection::vec(arb_emotion(), 1..100)) {
        let config = EmotionConfig::default();
        let mut state = EmotionState::INITIAL;
        for emotion in emotions {
            let level = state.growth_level;
            if emotion::apply(&mut state, emotion, config.growth_step, config.anger_weight) {
                #[allow(clippy::cast_precision_loss)]
                let threshold = level as f32 * config.growth_step;
                prop_assert!(growth_total(&state, config.anger_weight) > threshold);
            }
        }
    }
}
