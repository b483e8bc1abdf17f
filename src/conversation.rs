//! Virtual transcript for reading-passage generation.
//!
//! Three learning histories are turned into conversation events:
//!
//! - ask-mode chat rows, one event per message;
//! - translate-mode exchanges, one event per (learner, tutor) pair in a thread;
//! - flashcards the learner has not mastered, one prompt/answer pair per card.
//!
//! Events are merged by time and the oldest whole events are dropped until the
//! transcript fits the character budget, so a pair is never split.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Card, ChatMessage, ChatMode, MessageRole, ReviewRecord, Turn};
use crate::profile::dedupe;
use crate::queue::latest_reviews;

pub const DEFAULT_MAX_CHARS: usize = 32_000;
/// "Translate this" in the learner's native language, followed by a newline.
pub const DEFAULT_TRANSLATE_PROMPT: &str = "翻訳して\n";

// Declaration order is the tie-break for events sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Dialogue,
    TranslationPair,
    FlashcardPair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTag {
    ReviewTarget(String),
    NewTarget(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub turns: Vec<Turn>,
    pub char_count: usize,
    pub tag: Option<EventTag>,
}

impl ConversationEvent {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>, turns: Vec<Turn>) -> Self {
        let char_count = turns.iter().map(Turn::char_count).sum();
        Self {
            kind,
            timestamp,
            turns,
            char_count,
            tag: None,
        }
    }

    pub fn tagged(mut self, tag: EventTag) -> Self {
        self.tag = Some(tag);
        self
    }

    fn review_target(&self) -> Option<&str> {
        match &self.tag {
            Some(EventTag::ReviewTarget(target)) if !target.is_empty() => Some(target),
            _ => None,
        }
    }

    fn new_target(&self) -> Option<&str> {
        match &self.tag {
            Some(EventTag::NewTarget(target)) if !target.is_empty() => Some(target),
            _ => None,
        }
    }
}

pub struct ReadingRequest<'a> {
    pub chat_messages: &'a [ChatMessage],
    pub flashcards: &'a [Card],
    pub flashcard_reviews: &'a [ReviewRecord],
    pub max_chars: usize,
    pub translate_prompt: &'a str,
}

impl<'a> ReadingRequest<'a> {
    pub fn new(
        chat_messages: &'a [ChatMessage],
        flashcards: &'a [Card],
        flashcard_reviews: &'a [ReviewRecord],
    ) -> Self {
        Self {
            chat_messages,
            flashcards,
            flashcard_reviews,
            max_chars: DEFAULT_MAX_CHARS,
            translate_prompt: DEFAULT_TRANSLATE_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub dialogue_count: usize,
    pub translation_pair_count: usize,
    pub flashcard_pair_count: usize,
    pub trimmed_count: usize,
    pub context_chars: usize,
    pub total_events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingConversation {
    pub turns: Vec<Turn>,
    pub used_review_targets: Vec<String>,
    pub used_new_targets: Vec<String>,
    pub stats: ReadingStats,
}

pub fn dialogue_events(messages: &[ChatMessage]) -> Vec<ConversationEvent> {
    messages
        .iter()
        .filter(|msg| msg.mode == ChatMode::Ask)
        .filter_map(|msg| {
            let speaker = msg.role.speaker()?;
            let text = msg.content.trim();
            if text.is_empty() {
                return None;
            }
            Some(ConversationEvent::new(
                EventKind::Dialogue,
                msg.created_at,
                vec![Turn::new(speaker, text)],
            ))
        })
        .collect()
}

pub fn translation_events(messages: &[ChatMessage], prompt: &str) -> Vec<ConversationEvent> {
    // Threads keep the order they first appear in.
    let mut threads: Vec<Vec<&ChatMessage>> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for msg in messages {
        if msg.mode != ChatMode::Translate {
            continue;
        }
        let Some(thread_id) = msg.thread_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        if msg.content.trim().is_empty() || msg.role.speaker().is_none() {
            continue;
        }
        let slot = *slots.entry(thread_id).or_insert_with(|| {
            threads.push(Vec::new());
            threads.len() - 1
        });
        threads[slot].push(msg);
    }

    let mut events = Vec::new();
    for mut rows in threads {
        rows.sort_by_key(|msg| msg.created_at);

        let mut i = 0;
        while i + 1 < rows.len() {
            let (learner, tutor) = (rows[i], rows[i + 1]);
            if learner.role != MessageRole::User || tutor.role != MessageRole::Assistant {
                i += 1;
                continue;
            }

            let source = learner.content.trim();
            let turns = vec![
                Turn::learner(format!("{}{}", prompt, source)),
                Turn::tutor(tutor.content.trim()),
            ];
            events.push(
                ConversationEvent::new(EventKind::TranslationPair, tutor.created_at, turns)
                    .tagged(EventTag::NewTarget(source.to_string())),
            );
            i += 2;
        }
    }
    events
}

pub fn flashcard_events(
    cards: &[Card],
    reviews: &[ReviewRecord],
    prompt: &str,
) -> Vec<ConversationEvent> {
    let latest = latest_reviews(reviews);

    cards
        .iter()
        .filter_map(|card| {
            let front = card.front.trim();
            let back = card.back.trim();
            if front.is_empty() || back.is_empty() {
                return None;
            }

            let review = latest.get(card.id.as_str()).copied();
            if review.map_or(false, ReviewRecord::is_mastered) {
                return None;
            }

            let timestamp = review.map_or(card.created_at, |r| r.reviewed_at);
            let turns = vec![
                Turn::learner(format!("{}{}", prompt, back)),
                Turn::tutor(front),
            ];
            Some(
                ConversationEvent::new(EventKind::FlashcardPair, timestamp, turns)
                    .tagged(EventTag::ReviewTarget(front.to_string())),
            )
        })
        .collect()
}

/// Drops the oldest events until the total fits `max_chars`.
/// Returns the surviving events, how many were dropped and the final total.
pub fn trim_oldest(
    mut events: Vec<ConversationEvent>,
    max_chars: usize,
) -> (Vec<ConversationEvent>, usize, usize) {
    let mut context_chars: usize = events.iter().map(|event| event.char_count).sum();
    let mut start = 0;
    while context_chars > max_chars && start < events.len() {
        context_chars -= events[start].char_count;
        start += 1;
    }
    let kept = events.split_off(start);
    (kept, start, context_chars)
}

pub fn build_reading_conversation(request: &ReadingRequest<'_>) -> ReadingConversation {
    let mut events = dialogue_events(request.chat_messages);
    events.extend(translation_events(request.chat_messages, request.translate_prompt));
    events.extend(flashcard_events(
        request.flashcards,
        request.flashcard_reviews,
        request.translate_prompt,
    ));

    // Stable: equal (timestamp, kind) keeps encounter order.
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.kind.cmp(&b.kind)));

    let total_before = events.len();
    let (kept, trimmed_count, context_chars) = trim_oldest(events, request.max_chars);

    let count = |kind: EventKind| kept.iter().filter(|event| event.kind == kind).count();
    let stats = ReadingStats {
        dialogue_count: count(EventKind::Dialogue),
        translation_pair_count: count(EventKind::TranslationPair),
        flashcard_pair_count: count(EventKind::FlashcardPair),
        trimmed_count,
        context_chars,
        total_events: kept.len(),
    };

    let used_review_targets = dedupe(
        kept.iter()
            .filter_map(ConversationEvent::review_target)
            .map(str::to_string),
    );
    let used_new_targets = dedupe(
        kept.iter()
            .filter_map(ConversationEvent::new_target)
            .map(str::to_string),
    );

    tracing::debug!(
        events = total_before,
        trimmed = trimmed_count,
        context_chars,
        max_chars = request.max_chars,
        "built reading conversation"
    );

    ReadingConversation {
        turns: kept.into_iter().flat_map(|event| event.turns).collect(),
        used_review_targets,
        used_new_targets,
        stats,
    }
}
