//! SM-2 spaced repetition scheduling.
//!
//! - quality 0-2: the card lapsed. Repetition resets, the interval drops to one
//!   day and the ease factor loses 0.2.
//! - quality 3-5: repetition advances. Intervals go 1 day, 6 days, then the
//!   previous interval times the previous ease factor.
//! - The ease factor never falls below 1.3. Intervals stay between one day and
//!   `MAX_INTERVAL_DAYS`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ReviewRecord, DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR};

pub const MAX_QUALITY: i32 = 5;
pub const PASSING_QUALITY: i32 = 3;
/// One hundred years.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;
const LAPSE_EASE_PENALTY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sm2Input {
    pub quality: i32,
    pub repetition: u32,
    pub interval_days: u32,
    pub ease_factor: f64,
}

impl Sm2Input {
    /// Scheduling state of a card that has never been graded.
    pub fn fresh(quality: i32) -> Self {
        Self {
            quality,
            repetition: 0,
            interval_days: 1,
            ease_factor: DEFAULT_EASE_FACTOR,
        }
    }

    pub fn from_latest(latest: Option<&ReviewRecord>, quality: i32) -> Self {
        match latest {
            Some(review) => Self {
                quality,
                repetition: review.repetition,
                interval_days: review.interval_days,
                ease_factor: review.ease_factor,
            },
            None => Self::fresh(quality),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sm2Output {
    pub repetition: u32,
    pub interval_days: u32,
    pub ease_factor: f64,
}

pub fn next_sm2(input: Sm2Input) -> Sm2Output {
    let quality = input.quality.clamp(0, MAX_QUALITY);

    if quality < PASSING_QUALITY {
        return Sm2Output {
            repetition: 0,
            interval_days: 1,
            ease_factor: (input.ease_factor - LAPSE_EASE_PENALTY).max(MIN_EASE_FACTOR),
        };
    }

    let repetition = input.repetition.saturating_add(1);
    let interval_days = match repetition {
        1 => 1,
        2 => 6,
        _ => (input.interval_days as f64 * input.ease_factor).round() as u32,
    };

    let q = quality as f64;
    let ease_factor = (input.ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02)))
        .max(MIN_EASE_FACTOR);

    Sm2Output {
        repetition,
        interval_days: interval_days.clamp(1, MAX_INTERVAL_DAYS),
        ease_factor,
    }
}

// Binary grade offered by the review screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Remembered,
    Forgot,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Remembered => "remembered",
            Grade::Forgot => "forgot",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "remembered" | "r" | "yes" | "y" | "good" => Some(Grade::Remembered),
            "forgot" | "f" | "no" | "n" | "again" => Some(Grade::Forgot),
            _ => None,
        }
    }

    pub fn quality(&self) -> i32 {
        match self {
            Grade::Remembered => 4,
            Grade::Forgot => 2,
        }
    }
}

/// Applies a grade to a card's latest record and returns the record to append.
///
/// `next_review_at` is `reviewed_at` plus the new interval in whole days,
/// saturating at the latest representable time.
pub fn schedule_review(
    card_id: &str,
    latest: Option<&ReviewRecord>,
    quality: i32,
    reviewed_at: DateTime<Utc>,
) -> ReviewRecord {
    let quality = quality.clamp(0, MAX_QUALITY);
    let next = next_sm2(Sm2Input::from_latest(latest, quality));

    tracing::debug!(
        card_id,
        quality,
        repetition = next.repetition,
        interval_days = next.interval_days,
        ease_factor = next.ease_factor,
        "scheduled review"
    );

    let next_review_at = reviewed_at
        .checked_add_signed(Duration::days(i64::from(next.interval_days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    ReviewRecord {
        card_id: card_id.to_string(),
        quality,
        repetition: next.repetition,
        interval_days: next.interval_days,
        ease_factor: next.ease_factor,
        reviewed_at,
        next_review_at,
    }
}
