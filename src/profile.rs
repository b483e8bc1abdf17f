//! Learning profile: what the next generated passage should reinforce.
//!
//! Review targets come from due, weak and recently added cards. Grammar targets
//! are the heaviest chat signals. New candidates are the newest cards that are
//! not already being reviewed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Card, ChatSignal, FlashcardStat, LearningProfile, ReviewRecord};
use crate::queue::latest_reviews;

pub const REVIEW_SHARE: f64 = 0.7;
pub const FRESH_PER_REVIEW: f64 = 3.0 / 7.0;
const WRONG_QUALITY_MAX: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileLimits {
    pub weak_threshold: f64,
    pub max_weak: usize,
    pub recent_days: i64,
    pub max_review_targets: usize,
    pub max_grammar_targets: usize,
    pub max_new_candidates: usize,
    /// Only cards created this many days before `today` feed the stats. 0 disables.
    pub lookback_days: i64,
    pub wrong_window_days: i64,
}

impl Default for ProfileLimits {
    fn default() -> Self {
        Self {
            weak_threshold: 0.4,
            max_weak: 8,
            recent_days: 3,
            max_review_targets: 20,
            max_grammar_targets: 3,
            max_new_candidates: 10,
            lookback_days: 14,
            wrong_window_days: 7,
        }
    }
}

/// Start of a window of `days` ending at `today`, clamped to the earliest
/// representable time.
fn days_before(today: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|window| today.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Removes repeats, keeping the first occurrence of each item.
pub fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

pub fn build_learning_profile(
    cards: &[FlashcardStat],
    signals: &[ChatSignal],
    today: DateTime<Utc>,
) -> LearningProfile {
    build_learning_profile_with(cards, signals, today, &ProfileLimits::default())
}

pub fn build_learning_profile_with(
    cards: &[FlashcardStat],
    signals: &[ChatSignal],
    today: DateTime<Utc>,
    limits: &ProfileLimits,
) -> LearningProfile {
    let due = cards
        .iter()
        .filter(|card| card.next_review_at.map_or(false, |next| next <= today));

    let mut weak: Vec<&FlashcardStat> = cards
        .iter()
        .filter(|card| card.wrong_rate_7d >= limits.weak_threshold)
        .collect();
    weak.sort_by(|a, b| b.wrong_rate_7d.total_cmp(&a.wrong_rate_7d));
    weak.truncate(limits.max_weak);

    let recent_start = days_before(today, limits.recent_days);
    let recent = cards
        .iter()
        .filter(|card| card.created_at >= recent_start && card.created_at <= today);

    let mut review_targets = dedupe(
        due.chain(weak)
            .chain(recent)
            .map(|card| card.phrase.clone()),
    );
    review_targets.truncate(limits.max_review_targets);

    let mut ranked: Vec<&ChatSignal> = signals.iter().collect();
    ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    let mut grammar_targets = dedupe(ranked.into_iter().map(|signal| signal.signal_key.clone()));
    grammar_targets.truncate(limits.max_grammar_targets);

    let reviewing: HashSet<&str> = review_targets.iter().map(String::as_str).collect();
    let mut fresh: Vec<&FlashcardStat> = cards
        .iter()
        .filter(|card| !reviewing.contains(card.phrase.as_str()))
        .collect();
    fresh.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut new_candidates = dedupe(fresh.into_iter().map(|card| card.phrase.clone()));
    new_candidates.truncate(limits.max_new_candidates);

    tracing::debug!(
        cards = cards.len(),
        review = review_targets.len(),
        grammar = grammar_targets.len(),
        new = new_candidates.len(),
        "built learning profile"
    );

    LearningProfile {
        review_targets,
        grammar_targets,
        new_candidates,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenTargets {
    pub review: Vec<String>,
    pub fresh: Vec<String>,
}

// Roughly 70% review / 30% fresh, with at least one of each requested.
pub fn choose_targets(profile: &LearningProfile) -> ChosenTargets {
    let review_total = profile.review_targets.len() as f64;
    let review_count = ((review_total * REVIEW_SHARE).round() as usize).max(1);
    let fresh_count = ((review_count as f64 * FRESH_PER_REVIEW).round() as usize).max(1);

    ChosenTargets {
        review: profile.review_targets.iter().take(review_count).cloned().collect(),
        fresh: profile.new_candidates.iter().take(fresh_count).cloned().collect(),
    }
}

fn normalize_target(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Share of `required` found in `used`, ignoring case and surrounding space.
/// Nothing required counts as full coverage.
pub fn calc_coverage<R, U>(required: &[R], used: &[U]) -> f64
where
    R: AsRef<str>,
    U: AsRef<str>,
{
    if required.is_empty() {
        return 1.0;
    }
    let used: HashSet<String> = used.iter().map(|u| normalize_target(u.as_ref())).collect();
    let matched = required
        .iter()
        .filter(|target| used.contains(&normalize_target(target.as_ref())))
        .count();
    matched as f64 / required.len() as f64
}

/// Per-card stats for the profile: latest schedule and recent wrong-answer rate.
///
/// A review is wrong when its quality is 2 or less. Cards are returned newest
/// first.
pub fn derive_flashcard_stats(
    cards: &[Card],
    reviews: &[ReviewRecord],
    today: DateTime<Utc>,
    limits: &ProfileLimits,
) -> Vec<FlashcardStat> {
    let latest = latest_reviews(reviews);

    let mut by_card: HashMap<&str, Vec<&ReviewRecord>> = HashMap::new();
    for review in reviews {
        by_card.entry(review.card_id.as_str()).or_default().push(review);
    }

    let lookback_start = days_before(today, limits.lookback_days);
    let wrong_window_start = days_before(today, limits.wrong_window_days);

    let mut in_window: Vec<&Card> = cards
        .iter()
        .filter(|card| limits.lookback_days <= 0 || card.created_at >= lookback_start)
        .collect();
    in_window.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    in_window
        .into_iter()
        .map(|card| {
            let recent: Vec<&&ReviewRecord> = by_card
                .get(card.id.as_str())
                .map(|list| {
                    list.iter()
                        .filter(|r| r.reviewed_at >= wrong_window_start)
                        .collect()
                })
                .unwrap_or_default();
            let wrong = recent.iter().filter(|r| r.quality <= WRONG_QUALITY_MAX).count();
            let wrong_rate_7d = if recent.is_empty() {
                0.0
            } else {
                wrong as f64 / recent.len() as f64
            };

            FlashcardStat {
                phrase: card.front.clone(),
                next_review_at: latest.get(card.id.as_str()).map(|r| r.next_review_at),
                wrong_rate_7d,
                created_at: card.created_at,
            }
        })
        .collect()
}

/// Sums weights per signal key, heaviest first. Equal totals keep first-seen order.
pub fn aggregate_signals(signals: &[ChatSignal]) -> Vec<ChatSignal> {
    let mut totals: Vec<ChatSignal> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    for signal in signals {
        match slots.get(signal.signal_key.as_str()) {
            Some(&slot) => totals[slot].weight += signal.weight,
            None => {
                slots.insert(signal.signal_key.as_str(), totals.len());
                totals.push(signal.clone());
            }
        }
    }
    totals.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    totals
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the two texts' word sets, 0 when either is empty.
pub fn estimate_similarity(a: &str, b: &str) -> f64 {
    let left = word_set(a);
    let right = word_set(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub coverage: f64,
    pub similarity: f64,
    pub accepted: bool,
}

// Decides whether a generated passage is good enough to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationGate {
    pub min_coverage: f64,
    pub max_similarity: f64,
}

impl Default for GenerationGate {
    fn default() -> Self {
        Self {
            min_coverage: 0.7,
            max_similarity: 0.8,
        }
    }
}

impl GenerationGate {
    pub fn accepts(&self, coverage: f64, similarity: f64) -> bool {
        coverage >= self.min_coverage && similarity < self.max_similarity
    }

    pub fn evaluate<R, U>(
        &self,
        required: &[R],
        used: &[U],
        previous_passage: Option<&str>,
        passage: &str,
    ) -> GateVerdict
    where
        R: AsRef<str>,
        U: AsRef<str>,
    {
        let coverage = calc_coverage(required, used);
        let similarity = previous_passage.map_or(0.0, |prev| estimate_similarity(prev, passage));
        GateVerdict {
            coverage,
            similarity,
            accepted: self.accepts(coverage, similarity),
        }
    }
}
