//! Topic Confidence Updates
//!
//! This module applies a single practice attempt to a learner's per-topic
//! mastery confidence using an exponential moving average. The function is
//! pure: persistence of the resulting state is left to the caller.

use serde::{Deserialize, Serialize};

/// Confidence at or above this value marks a topic as mastered.
pub const MASTERY_THRESHOLD: f64 = 0.75;
/// Topics practiced to a confidence below this value are due for review.
pub const WEAK_TOPIC_THRESHOLD: f64 = 0.5;
/// Weight applied to each new attempt outcome.
pub const EMA_ALPHA: f64 = 0.3;
pub const CONFIDENCE_BOOST_CORRECT: f64 = 0.15;
pub const CONFIDENCE_PENALTY_INCORRECT: f64 = 0.10;
/// Smallest multiplier a hinted correct answer can earn.
pub const MIN_HINT_MULTIPLIER: f64 = 0.25;
const HINT_STEP: f64 = 0.25;

/// The learner's self-reported confidence for a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    NotConfident,
    Neutral,
    VeryConfident,
}

impl ConfidenceLevel {
    /// Maps the 1-3 rating scale used by clients. Anything else is `None`.
    pub fn from_rating(rating: i64) -> Option<Self> {
        match rating {
            1 => Some(Self::NotConfident),
            2 => Some(Self::Neutral),
            3 => Some(Self::VeryConfident),
            _ => None,
        }
    }

    /// Scales the confidence delta of an attempt.
    pub fn weight(self) -> f64 {
        match self {
            Self::NotConfident => 0.7,
            Self::Neutral => 1.0,
            Self::VeryConfident => 1.3,
        }
    }
}

/// The mutable part of a topic progress record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MasteryState {
    pub current_confidence: f64,
    pub problems_attempted: i32,
    pub problems_correct: i32,
    pub mastered: bool,
}

/// Multiplier applied to the reward of a correct answer that needed hints.
pub fn hint_multiplier(hints_used_count: u32) -> f64 {
    (1.0 - hints_used_count as f64 * HINT_STEP).max(MIN_HINT_MULTIPLIER)
}

/// Applies one attempt outcome to the previous state.
///
/// A missing previous state starts from zero confidence and zero counts.
/// The returned confidence is always within `[0, 1]` and `mastered` is
/// derived from it at this point, never lazily.
pub fn update_confidence(
    existing: Option<&MasteryState>,
    was_correct: bool,
    user_confidence: Option<ConfidenceLevel>,
    hints_used_count: u32,
) -> MasteryState {
    let previous = existing.copied().unwrap_or_default();
    let current = if previous.current_confidence.is_finite() {
        previous.current_confidence
    } else {
        0.0
    };

    let mut delta = if was_correct {
        CONFIDENCE_BOOST_CORRECT
    } else {
        -CONFIDENCE_PENALTY_INCORRECT
    };

    if let Some(level) = user_confidence {
        delta *= level.weight();
    }

    if was_correct && hints_used_count > 0 {
        delta *= hint_multiplier(hints_used_count);
    }

    let current_confidence = (current + EMA_ALPHA * delta).clamp(0.0, 1.0);

    MasteryState {
        current_confidence,
        problems_attempted: previous.problems_attempted.saturating_add(1),
        problems_correct: if was_correct {
            previous.problems_correct.saturating_add(1)
        } else {
            previous.problems_correct
        },
        mastered: current_confidence >= MASTERY_THRESHOLD,
    }
}
