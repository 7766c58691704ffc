//! Practice Problem Selection
//!
//! Picks the next topic to practice with a weighted random draw that favors
//! low-confidence and stale topics, then picks a problem inside that topic.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Weight of a topic the learner has never attempted.
pub const BASE_TOPIC_WEIGHT: f64 = 1.0;
/// Keeps fully confident topics in the draw.
pub const CONFIDENCE_FLOOR: f64 = 0.1;
/// Number of days after which a topic gets the full staleness boost.
pub const STALENESS_DAYS: f64 = 7.0;
/// Amplifies topics that have progress data relative to untouched ones.
pub const PROGRESS_AMPLIFIER: f64 = 5.0;
/// Probability of preferring a problem the learner has never seen.
pub const NEW_PROBLEM_RATIO: f64 = 0.3;

const SECONDS_PER_DAY: f64 = 60.0 * 60.0 * 24.0;

/// The progress fields that drive topic weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopicSignal {
    pub current_confidence: f64,
    pub last_practiced: Option<DateTime<Utc>>,
}

/// The outcome of a topic draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSelection {
    pub topic_id: i64,
    /// Set when the draw ran past every weight and the last topic was used.
    pub fallback: bool,
}

/// The outcome of a problem draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProblemSelection<'a, P> {
    pub problem: &'a P,
    /// Set when the pick came from the pool of problems never attempted.
    pub preferred_new: bool,
}

/// Anything with a problem id can be selected.
pub trait Identified {
    fn id(&self) -> i64;
}

/// Computes the draw weight of one topic.
pub fn topic_weight(progress: Option<&TopicSignal>, now: DateTime<Utc>) -> f64 {
    let Some(progress) = progress else {
        return BASE_TOPIC_WEIGHT;
    };

    let confidence = progress.current_confidence.clamp(0.0, 1.0);
    let mut weight = 1.0 - confidence + CONFIDENCE_FLOOR;

    if let Some(last_practiced) = progress.last_practiced {
        let elapsed = (now - last_practiced).num_milliseconds() as f64 / 1000.0;
        let days_since = (elapsed / SECONDS_PER_DAY).max(0.0);
        let time_boost = (days_since / STALENESS_DAYS).min(1.0);
        weight *= 1.0 + time_boost;
    }

    weight * PROGRESS_AMPLIFIER
}

/// Walks the weights, subtracting each from `draw` until it is used up.
///
/// Returns the chosen index and whether the loop ran off the end, in which case
/// the last index is chosen. `weights` must not be empty.
pub fn pick_weighted(weights: &[f64], draw: f64) -> (usize, bool) {
    let mut remaining = draw;
    for (index, weight) in weights.iter().enumerate() {
        remaining -= weight;
        if remaining <= 0.0 {
            return (index, false);
        }
    }
    (weights.len().saturating_sub(1), true)
}

/// Draws a topic, favoring low confidence and staleness.
///
/// Returns `None` only when `topic_ids` is empty.
pub fn select_topic<R: Rng>(
    topic_ids: &[i64],
    progress_by_topic: &HashMap<i64, TopicSignal>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<TopicSelection> {
    if topic_ids.is_empty() {
        return None;
    }

    let weights: Vec<f64> = topic_ids
        .iter()
        .map(|id| topic_weight(progress_by_topic.get(id), now))
        .collect();
    let total: f64 = weights.iter().sum();
    let draw = rng.random::<f64>() * total;

    let (index, fallback) = pick_weighted(&weights, draw);
    Some(TopicSelection {
        topic_id: topic_ids[index],
        fallback,
    })
}

/// Picks a problem from `candidates`.
///
/// Problems in `excluded` are never returned. With probability
/// [`NEW_PROBLEM_RATIO`] a problem outside `previously_attempted` is preferred
/// when one exists; otherwise the pick is uniform over what remains.
pub fn select_problem<'a, P, R>(
    candidates: &'a [P],
    excluded: &HashSet<i64>,
    previously_attempted: &HashSet<i64>,
    rng: &mut R,
) -> Option<ProblemSelection<'a, P>>
where
    P: Identified,
    R: Rng,
{
    let available: Vec<&P> = candidates
        .iter()
        .filter(|p| !excluded.contains(&p.id()))
        .collect();
    if available.is_empty() {
        return None;
    }

    let fresh: Vec<&P> = available
        .iter()
        .copied()
        .filter(|p| !previously_attempted.contains(&p.id()))
        .collect();
    let should_pick_new = rng.random::<f64>() < NEW_PROBLEM_RATIO;

    if should_pick_new && !fresh.is_empty() {
        let problem = fresh[rng.random_range(0..fresh.len())];
        return Some(ProblemSelection {
            problem,
            preferred_new: true,
        });
    }

    let problem = available[rng.random_range(0..available.len())];
    Some(ProblemSelection {
        problem,
        preferred_new: false,
    })
}
