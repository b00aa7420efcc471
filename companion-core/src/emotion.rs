//! Emotion/Growth Engine.
//!
//! Five non-negative accumulators move by small fixed deltas per emotion tag.
//! After every update the growth total `joy + trust + surprise - w·anger` is
//! compared against `level × step`; crossing it raises the level by one.
//! The level never decreases and has no cap.
//!
//! State is snapshotted once per calendar day (later writes the same day
//! overwrite that day). Today's snapshot, if any, is the starting state.
//! Persistence failures are logged and swallowed; memory stays authoritative.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, NaiveDate};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EmotionConfig;
use crate::error::Result;
use crate::types::{Emotion, EmotionState, SafetyDecision};

// ---------------------------------------------------------------------------
// Snapshot storage
// ---------------------------------------------------------------------------

/// Once-per-day storage for [`EmotionState`].
pub trait SnapshotStore: Send + Sync {
    /// Snapshot for `date`, if one was saved.
    ///
    /// # Errors
    /// Backend failure.
    fn load(&self, date: NaiveDate) -> Result<Option<EmotionState>>;

    /// Write (or overwrite) the snapshot for `date`.
    ///
    /// # Errors
    /// Backend failure.
    fn save(&self, date: NaiveDate, state: &EmotionState) -> Result<()>;

    /// Snapshot for the local calendar date.
    ///
    /// # Errors
    /// Backend failure.
    fn load_today(&self) -> Result<Option<EmotionState>> {
        self.load(Local::now().date_naive())
    }

    /// Write the snapshot for the local calendar date.
    ///
    /// # Errors
    /// Backend failure.
    fn save_today(&self, state: &EmotionState) -> Result<()> {
        self.save(Local::now().date_naive(), state)
    }
}

/// In-process snapshots keyed by date.
#[derive(Debug, Default)]
pub struct MemorySnapshots {
    days: RwLock<HashMap<NaiveDate, EmotionState>>,
}

impl MemorySnapshots {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of days with a snapshot.
    #[must_use]
    pub fn days(&self) -> usize {
        self.days.read().len()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn load(&self, date: NaiveDate) -> Result<Option<EmotionState>> {
        Ok(self.days.read().get(&date).copied())
    }

    fn save(&self, date: NaiveDate, state: &EmotionState) -> Result<()> {
        self.days.write().insert(date, *state);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deltas and growth
// ---------------------------------------------------------------------------

/// Per-axis increments for one emotion tag.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Delta {
    /// Joy increment.
    pub joy: f32,
    /// Sadness increment.
    pub sadness: f32,
    /// Anger increment.
    pub anger: f32,
    /// Surprise increment.
    pub surprise: f32,
    /// Trust increment.
    pub trust: f32,
}

impl Delta {
    /// The fixed increment table.
    #[must_use]
    pub fn for_emotion(emotion: Emotion) -> Self {
        let zero = Self::default();
        match emotion {
            Emotion::Happy => Self { joy: 0.10, trust: 0.05, ..zero },
            Emotion::Encouraging => Self { joy: 0.08, trust: 0.06, ..zero },
            Emotion::Gentle => Self { joy: 0.05, trust: 0.08, ..zero },
            Emotion::Sad => Self { sadness: 0.10, trust: 0.03, ..zero },
            Emotion::Angry => Self { anger: 0.10, ..zero },
            Emotion::Surprised => Self { surprise: 0.10, ..zero },
            Emotion::Thinking => Self { surprise: 0.05, ..zero },
            Emotion::Neutral => Self { trust: 0.02, ..zero },
        }
    }
}

/// Apply one emotion to `state`. Returns whether the growth level rose.
pub fn apply(state: &mut EmotionState, emotion: Emotion, growth_step: f32, anger_weight: f32) -> bool {
    let d = Delta::for_emotion(emotion);
    state.joy += d.joy;
    state.sadness += d.sadness;
    state.anger += d.anger;
    state.surprise += d.surprise;
    state.trust += d.trust;

    #[allow(clippy::cast_precision_loss)]
    let threshold = state.growth_level as f32 * growth_step;
    if growth_total(state, anger_weight) > threshold {
        state.growth_level = state.growth_level.saturating_add(1);
        true
    } else {
        false
    }
}

/// `joy + trust + surprise - anger_weight × anger`.
#[must_use]
pub fn growth_total(state: &EmotionState, anger_weight: f32) -> f32 {
    state.joy + state.trust + state.surprise - anger_weight * state.anger
}

// ---------------------------------------------------------------------------
// Tone hint
// ---------------------------------------------------------------------------

/// Accumulator level above which an axis drives the tone.
pub const TONE_CUTOFF: f32 = 1.5;

/// Coarse mood label for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneHint {
    /// Anger dominates.
    CalmDown,
    /// Sadness dominates.
    Soothe,
    /// Joy dominates.
    Bright,
    /// Surprise dominates.
    Curious,
    /// Nothing stands out.
    NeutralCaring,
}

impl ToneHint {
    /// First matching cutoff in order anger, sadness, joy, surprise.
    #[must_use]
    pub fn from_state(state: &EmotionState) -> Self {
        if state.anger > TONE_CUTOFF {
            Self::CalmDown
        } else if state.sadness > TONE_CUTOFF {
            Self::Soothe
        } else if state.joy > TONE_CUTOFF {
            Self::Bright
        } else if state.surprise > TONE_CUTOFF {
            Self::Curious
        } else {
            Self::NeutralCaring
        }
    }

    /// Wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CalmDown => "calm_down",
            Self::Soothe => "soothe",
            Self::Bright => "bright",
            Self::Curious => "curious",
            Self::NeutralCaring => "neutral_caring",
        }
    }
}

impl fmt::Display for ToneHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the live [`EmotionState`] and its daily snapshot.
pub struct EmotionEngine {
    state: Mutex<EmotionState>,
    store: Arc<dyn SnapshotStore>,
    config: EmotionConfig,
    snapshot_failures: AtomicU64,
}

impl fmt::Debug for EmotionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmotionEngine")
            .field("state", &*self.state.lock())
            .field("snapshot_failures", &self.snapshot_failures())
            .finish_non_exhaustive()
    }
}

impl EmotionEngine {
    /// Start from today's snapshot, or the zero state.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, config: EmotionConfig) -> Self {
        let state = match store.load_today() {
            Ok(Some(state)) => {
                info!(level = state.growth_level, "Resuming today's emotion snapshot");
                state
            }
            Ok(None) => EmotionState::INITIAL,
            Err(e) => {
                warn!(error = %e, "Could not load emotion snapshot, starting fresh");
                EmotionState::INITIAL
            }
        };
        Self {
            state: Mutex::new(state),
            store,
            config,
            snapshot_failures: AtomicU64::new(0),
        }
    }

    /// In-memory engine with default tuning.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshots::new()), EmotionConfig::default())
    }

    /// Feed one emotion tag and upsert today's snapshot.
    /// Returns whether the snapshot write succeeded.
    pub fn update(&self, emotion: Emotion) -> bool {
        let snapshot = {
            let mut state = self.state.lock();
            let leveled = apply(&mut state, emotion, self.config.growth_step, self.config.anger_weight);
            if leveled {
                info!(level = state.growth_level, "Growth level up");
            }
            *state
        };
        debug!(emotion = %emotion, ?snapshot, "Emotion updated");

        match self.store.save_today(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Emotion snapshot write failed");
                false
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EmotionState {
        *self.state.lock()
    }

    /// Mood label for the current state.
    #[must_use]
    pub fn tone_hint(&self) -> ToneHint {
        ToneHint::from_state(&self.state.lock())
    }

    /// Failed snapshot writes since startup.
    #[must_use]
    pub fn snapshot_failures(&self) -> u64 {
        self.snapshot_failures.load(Ordering::Relaxed)
    }

    /// The companion's emotion for a turn.
    ///
    /// Cue words in the utterance win (sad, angry, surprised, happy, in that
    /// order). Otherwise the decision picks: Block is gentle, Caution is
    /// thinking, Allow is encouraging with real content and neutral with the
    /// fallback.
    #[must_use]
    pub fn derive_emotion(&self, utterance: &str, decision: SafetyDecision, fallback_used: bool) -> Emotion {
        let lowered = utterance.to_lowercase();
        let cues = &self.config.cues;
        let hit = |words: &[String]| words.iter().any(|w| lowered.contains(&w.to_lowercase()));
        if hit(&cues.sad) {
            Emotion::Sad
        } else if hit(&cues.angry) {
            Emotion::Angry
        } else if hit(&cues.surprised) {
            Emotion::Surprised
        } else if hit(&cues.happy) {
            Emotion::Happy
        } else {
            match decision {
                SafetyDecision::Block => Emotion::Gentle,
                SafetyDecision::Caution => Emotion::Thinking,
                SafetyDecision::Allow if fallback_used => Emotion::Neutral,
                SafetyDecision::Allow => Emotion::Encouraging,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompanionError;

    struct Failing;

    impl SnapshotStore for Failing {
        fn load(&self, _date: NaiveDate) -> Result<Option<EmotionState>> {
            Err(CompanionError::Io(std::io::Error::other("unreadable")))
        }
        fn save(&self, _date: NaiveDate, _state: &EmotionState) -> Result<()> {
            Err(CompanionError::Io(std::io::Error::other("read-only")))
        }
    }

    #[test]
    fn deltas_stay_small() {
        for emotion in Emotion::ALL {
            let d = Delta::for_emotion(*emotion);
            for v in [d.joy, d.sadness, d.anger, d.surprise, d.trust] {
                assert!((0.0..=0.10).contains(&v), "{emotion}: {v}");
            }
            let sum = d.joy + d.sadness + d.anger + d.surprise + d.trust;
            assert!(sum >= 0.01, "{emotion} must move some axis");
        }
    }

    #[test]
    fn growth_levels_up_past_threshold() {
        let mut state = EmotionState::INITIAL;
        let mut ups = 0;
        // happy adds 0.15 to the total; level 1 needs > 5.0.
        for _ in 0..34 {
            if apply(&mut state, Emotion::Happy, 5.0, 0.7) {
                ups += 1;
            }
        }
        assert_eq!(ups, 1);
        assert_eq!(state.growth_level, 2);
    }

    #[test]
    fn anger_holds_growth_back() {
        let mut state = EmotionState {
            anger: 10.0,
            joy: 5.5,
            ..EmotionState::INITIAL
        };
        assert!(!apply(&mut state, Emotion::Neutral, 5.0, 0.7));
        assert_eq!(state.growth_level, 1);
    }

    #[test]
    fn one_level_per_update() {
        let mut state = EmotionState {
            joy: 100.0,
            ..EmotionState::INITIAL
        };
        assert!(apply(&mut state, Emotion::Neutral, 5.0, 0.7));
        assert_eq!(state.growth_level, 2);
    }

    #[test]
    fn tone_hint_order() {
        let mut state = EmotionState::INITIAL;
        assert_eq!(ToneHint::from_state(&state), ToneHint::NeutralCaring);
        state.surprise = 2.0;
        assert_eq!(ToneHint::from_state(&state), ToneHint::Curious);
        state.joy = 2.0;
        assert_eq!(ToneHint::from_state(&state), ToneHint::Bright);
        state.sadness = 2.0;
        assert_eq!(ToneHint::from_state(&state), ToneHint::Soothe);
        state.anger = 2.0;
        assert_eq!(ToneHint::from_state(&state), ToneHint::CalmDown);
        assert_eq!(ToneHint::CalmDown.to_string(), "calm_down");
        state.anger = 1.5;
        assert_eq!(ToneHint::from_state(&state), ToneHint::Soothe, "cutoff is strict");
    }

    #[test]
    fn update_writes_todays_snapshot() {
        let store = Arc::new(MemorySnapshots::new());
        let engine = EmotionEngine::new(store.clone(), EmotionConfig::default());
        assert!(engine.update(Emotion::Happy));
        assert!(engine.update(Emotion::Sad));
        assert_eq!(store.days(), 1);
        let saved = store.load_today().expect("load").expect("saved");
        assert_eq!(saved, engine.state());
    }

    #[test]
    fn resumes_from_todays_snapshot() {
        let store = Arc::new(MemorySnapshots::new());
        let earlier = EmotionState {
            trust: 3.0,
            growth_level: 4,
            ..EmotionState::INITIAL
        };
        store.save_today(&earlier).expect("save");
        let engine = EmotionEngine::new(store, EmotionConfig::default());
        assert_eq!(engine.state(), earlier);
    }

    #[test]
    fn snapshot_failures_are_swallowed() {
        let engine = EmotionEngine::new(Arc::new(Failing), EmotionConfig::default());
        assert_eq!(engine.state(), EmotionState::INITIAL);
        assert!(!engine.update(Emotion::Happy));
        assert_eq!(engine.snapshot_failures(), 1);
        assert!(engine.state().joy > 0.0);
    }

    #[test]
    fn derived_emotion() {
        let engine = EmotionEngine::in_memory();
        assert_eq!(engine.derive_emotion("試験に落ちて悲しい", SafetyDecision::Allow, false), Emotion::Sad);
        assert_eq!(engine.derive_emotion("Thank you!", SafetyDecision::Allow, false), Emotion::Happy);
        assert_eq!(engine.derive_emotion("教えて", SafetyDecision::Block, false), Emotion::Gentle);
        assert_eq!(engine.derive_emotion("教えて", SafetyDecision::Caution, false), Emotion::Thinking);
        assert_eq!(engine.derive_emotion("教えて", SafetyDecision::Allow, false), Emotion::Encouraging);
        assert_eq!(engine.derive_emotion("教えて", SafetyDecision::Allow, true), Emotion::Neutral);
    }
}
