//! Due-card review queue.
//!
//! Only cards that are due right now are queued. Cards scheduled for later are
//! left out entirely; the earliest of them is reported as `next_due_at`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Card, ReviewRecord};

pub const DEFAULT_MAX_QUEUE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub card_id: String,
    pub front: String,
    pub back: String,
    pub next_review_at: Option<DateTime<Utc>>,
    pub is_due: bool,
}

impl QueueItem {
    pub fn is_new(&self) -> bool {
        self.next_review_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQueue {
    pub queue: Vec<QueueItem>,
    pub total: usize,
    pub next_due_at: Option<DateTime<Utc>>,
}

impl ReviewQueue {
    pub fn new_count(&self) -> usize {
        self.queue.iter().filter(|item| item.is_new()).count()
    }

    pub fn overdue_count(&self) -> usize {
        self.total - self.new_count()
    }
}

pub struct QueueRequest<'a> {
    pub cards: &'a [Card],
    pub reviews: &'a [ReviewRecord],
    pub now: DateTime<Utc>,
    pub max_queue: usize,
}

impl<'a> QueueRequest<'a> {
    pub fn new(cards: &'a [Card], reviews: &'a [ReviewRecord], now: DateTime<Utc>) -> Self {
        Self {
            cards,
            reviews,
            now,
            max_queue: DEFAULT_MAX_QUEUE,
        }
    }

    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }
}

/// Most recent record per card by `reviewed_at`. The first record seen wins a tie.
pub fn latest_reviews(reviews: &[ReviewRecord]) -> HashMap<&str, &ReviewRecord> {
    let mut latest: HashMap<&str, &ReviewRecord> = HashMap::new();
    for review in reviews {
        latest
            .entry(review.card_id.as_str())
            .and_modify(|current| {
                if review.reviewed_at > current.reviewed_at {
                    *current = review;
                }
            })
            .or_insert(review);
    }
    latest
}

pub fn build_review_queue(request: &QueueRequest<'_>) -> ReviewQueue {
    let latest = latest_reviews(request.reviews);

    let mut due: Vec<(QueueItem, DateTime<Utc>)> = request
        .cards
        .iter()
        .filter_map(|card| {
            let next_review_at = latest.get(card.id.as_str()).map(|r| r.next_review_at);
            let is_due = next_review_at.map_or(true, |next| next <= request.now);
            if !is_due {
                return None;
            }
            let item = QueueItem {
                card_id: card.id.clone(),
                front: card.front.clone(),
                back: card.back.clone(),
                next_review_at,
                is_due,
            };
            Some((item, card.created_at))
        })
        .collect();

    // None sorts before Some, so never-reviewed cards come first.
    // Stable sort keeps input order for full ties.
    due.sort_by(|(a, a_created), (b, b_created)| {
        a.next_review_at
            .cmp(&b.next_review_at)
            .then_with(|| b_created.cmp(a_created))
    });

    let known: HashSet<&str> = request.cards.iter().map(|card| card.id.as_str()).collect();
    let next_due_at = latest
        .iter()
        .filter(|(card_id, _)| known.contains(*card_id))
        .map(|(_, review)| review.next_review_at)
        .filter(|next| *next > request.now)
        .min();

    let due_count = due.len();
    let queue: Vec<QueueItem> = due
        .into_iter()
        .take(request.max_queue)
        .map(|(item, _)| item)
        .collect();

    tracing::debug!(
        cards = request.cards.len(),
        due = due_count,
        queued = queue.len(),
        next_due_at = ?next_due_at,
        "built review queue"
    );

    ReviewQueue {
        total: queue.len(),
        queue,
        next_due_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0).unwrap()
    }

    fn card(id: &str, created_at: DateTime<Utc>) -> Card {
        Card {
            id: id.to_string(),
            front: format!("{} en", id),
            back: format!("{} ja", id),
            created_at,
        }
    }

    fn review(
        card_id: &str,
        reviewed_at: DateTime<Utc>,
        next_review_at: DateTime<Utc>,
    ) -> ReviewRecord {
        ReviewRecord {
            card_id: card_id.to_string(),
            quality: 4,
            repetition: 1,
            interval_days: 1,
            ease_factor: 2.5,
            reviewed_at,
            next_review_at,
        }
    }

    fn ids(queue: &ReviewQueue) -> Vec<&str> {
        queue.queue.iter().map(|item| item.card_id.as_str()).collect()
    }

    mod latest_reviews_tests {
        use super::*;

        #[test]
        fn keeps_most_recent_regardless_of_order() {
            let reviews = vec![
                review("c1", ts(10, 0), ts(11, 0)),
                review("c1", ts(14, 0), ts(20, 0)),
                review("c1", ts(12, 0), ts(13, 0)),
            ];
            let latest = latest_reviews(&reviews);
            assert_eq!(latest["c1"].next_review_at, ts(20, 0));
        }

        #[test]
        fn first_seen_wins_exact_tie() {
            let reviews = vec![
                review("c1", ts(10, 0), ts(11, 0)),
                review("c1", ts(10, 0), ts(25, 0)),
            ];
            let latest = latest_reviews(&reviews);
            assert_eq!(latest["c1"].next_review_at, ts(11, 0));
        }
    }

    mod build_review_queue_tests {
        use super::*;

        #[test]
        fn empty_inputs_give_empty_queue() {
            let result = build_review_queue(&QueueRequest::new(&[], &[], ts(27, 12)));
            assert!(result.queue.is_empty());
            assert_eq!(result.total, 0);
            assert!(result.next_due_at.is_none());
        }

        #[test]
        fn only_future_cards_give_empty_queue_with_next_due() {
            let cards = vec![card("c1", ts(20, 0))];
            let reviews = vec![review("c1", ts(27, 0), ts(28, 0))];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, ts(27, 12)));
            assert_eq!(result.total, 0);
            assert_eq!(result.next_due_at, Some(ts(28, 0)));
        }

        #[test]
        fn never_reviewed_card_is_due() {
            let cards = vec![card("new-card", ts(27, 10))];
            let result = build_review_queue(&QueueRequest::new(&cards, &[], ts(27, 12)));
            assert_eq!(result.total, 1);
            assert!(result.queue[0].is_due);
            assert!(result.queue[0].next_review_at.is_none());
            assert!(result.queue[0].is_new());
        }

        #[test]
        fn due_and_new_queued_future_excluded() {
            let now = ts(27, 12);
            let cards = vec![
                card("due", ts(1, 0)),
                card("not-due", ts(2, 0)),
                card("new", ts(3, 0)),
            ];
            let reviews = vec![
                review("due", ts(14, 0), ts(20, 0)),
                review("not-due", ts(27, 0), now + Duration::days(2)),
            ];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert_eq!(ids(&result), vec!["new", "due"]);
            assert_eq!(result.total, 2);
            assert_eq!(result.next_due_at, Some(now + Duration::days(2)));
            assert_eq!(result.new_count(), 1);
            assert_eq!(result.overdue_count(), 1);
        }

        #[test]
        fn overdue_by_one_vs_due_in_one() {
            let now = ts(15, 12);
            let cards = vec![card("past", ts(1, 0)), card("future", ts(1, 0))];
            let reviews = vec![
                review("past", ts(10, 0), now - Duration::hours(1)),
                review("future", ts(10, 0), now + Duration::hours(1)),
            ];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert_eq!(ids(&result), vec!["past"]);
            assert_eq!(result.next_due_at, Some(now + Duration::hours(1)));
        }

        #[test]
        fn due_exactly_now_is_due() {
            let now = ts(15, 12);
            let cards = vec![card("c1", ts(1, 0))];
            let reviews = vec![review("c1", ts(10, 0), now)];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert_eq!(ids(&result), vec!["c1"]);
            assert!(result.next_due_at.is_none());
        }

        #[test]
        fn most_overdue_first() {
            let now = ts(20, 0);
            let cards = vec![card("a", ts(1, 0)), card("b", ts(1, 0)), card("c", ts(1, 0))];
            let reviews = vec![
                review("a", ts(2, 0), ts(18, 0)),
                review("b", ts(2, 0), ts(5, 0)),
                review("c", ts(2, 0), ts(10, 0)),
            ];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert_eq!(ids(&result), vec!["b", "c", "a"]);
        }

        #[test]
        fn ties_break_on_newest_card() {
            let now = ts(20, 0);
            let cards = vec![card("old", ts(1, 0)), card("newer", ts(5, 0)), card("mid", ts(3, 0))];
            let reviews = vec![
                review("old", ts(6, 0), ts(10, 0)),
                review("newer", ts(6, 0), ts(10, 0)),
                review("mid", ts(6, 0), ts(10, 0)),
            ];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert_eq!(ids(&result), vec!["newer", "mid", "old"]);
        }

        #[test]
        fn new_cards_order_newest_first() {
            let cards = vec![card("first", ts(1, 0)), card("second", ts(2, 0))];
            let result = build_review_queue(&QueueRequest::new(&cards, &[], ts(20, 0)));
            assert_eq!(ids(&result), vec!["second", "first"]);
        }

        #[test]
        fn uses_latest_review_only() {
            let now = ts(20, 0);
            let cards = vec![card("c1", ts(1, 0))];
            // An older record said due; the newer one pushed it out.
            let reviews = vec![
                review("c1", ts(19, 0), ts(25, 0)),
                review("c1", ts(5, 0), ts(6, 0)),
            ];
            let result = build_review_queue(&QueueRequest::new(&cards, &reviews, now));
            assert!(result.queue.is_empty());
            assert_eq!(result.next_due_at, Some(ts(25, 0)));
        }

        #[test]
        fn caps_queue_and_total() {
            let now = ts(21, 12);
            let cards: Vec<Card> = (0..70)
                .map(|i| card(&i.to_string(), ts(i % 28 + 1, 0)))
                .collect();
            let result =
                build_review_queue(&QueueRequest::new(&cards, &[], now).with_max_queue(50));
            assert_eq!(result.queue.len(), 50);
            assert_eq!(result.total, 50);
        }

        #[test]
        fn default_cap_is_fifty() {
            let request = QueueRequest::new(&[], &[], ts(1, 0));
            assert_eq!(request.max_queue, DEFAULT_MAX_QUEUE);
            assert_eq!(DEFAULT_MAX_QUEUE, 50);
        }

        #[test]
        fn orphan_reviews_do_not_set_next_due() {
            let now = ts(10, 0);
            let reviews = vec![review("deleted", ts(9, 0), ts(12, 0))];
            let result = build_review_queue(&QueueRequest::new(&[], &reviews, now));
            assert!(result.next_due_at.is_none());
        }
    }

    proptest! {
        #[test]
        fn queued_items_are_due_and_sorted(
            offsets in proptest::collection::vec(proptest::option::of(-100i64..100), 0..40),
            max_queue in 0usize..60,
        ) {
            let now = ts(15, 0);
            let cards: Vec<Card> = offsets
                .iter()
                .enumerate()
                .map(|(i, _)| card(&format!("c{}", i), ts(1, 0) + Duration::minutes(i as i64)))
                .collect();
            let reviews: Vec<ReviewRecord> = offsets
                .iter()
                .enumerate()
                .filter_map(|(i, offset)| {
                    offset.map(|h| review(&format!("c{}", i), ts(1, 0), now + Duration::hours(h)))
                })
                .collect();

            let result = build_review_queue(
                &QueueRequest::new(&cards, &reviews, now).with_max_queue(max_queue),
            );

            prop_assert!(result.total <= max_queue);
            prop_assert_eq!(result.total, result.queue.len());
            for item in &result.queue {
                prop_assert!(item.is_due);
                prop_assert!(item.next_review_at.map_or(true, |next| next <= now));
            }
            for pair in result.queue.windows(2) {
                prop_assert!(pair[0].next_review_at <= pair[1].next_review_at);
            }
            if let Some(next) = result.next_due_at {
                prop_assert!(next > now);
            }
        }
    }
}
