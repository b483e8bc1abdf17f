//! Bounded chat history for ask-mode requests.
//!
//! The model gets the last few exchanges plus the new message. Every message
//! gets the same share of the character budget and keeps its tail when cut.

use crate::models::{DialogueRow, Turn};

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 5;
pub const DEFAULT_MAX_TOTAL_CHARS: usize = 3000;
pub const ELLIPSIS: &str = "...";

pub struct AskContextRequest<'a> {
    pub rows: &'a [DialogueRow],
    pub latest_message: &'a str,
    pub max_history_turns: usize,
    pub max_total_chars: usize,
}

impl<'a> AskContextRequest<'a> {
    pub fn new(rows: &'a [DialogueRow], latest_message: &'a str) -> Self {
        Self {
            rows,
            latest_message,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            max_total_chars: DEFAULT_MAX_TOTAL_CHARS,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_history_turns.saturating_mul(2).saturating_add(1)
    }
}

/// Keeps the last `max_chars` characters of `text`, marking the cut with `...`
/// when there is room for it.
pub fn truncate_keep_tail(text: &str, max_chars: usize) -> String {
    let len = text.chars().count();
    if len <= max_chars {
        return text.to_string();
    }
    let marker = ELLIPSIS.chars().count();
    if max_chars <= marker {
        return text.chars().skip(len - max_chars).collect();
    }
    let keep = max_chars - marker;
    let tail: String = text.chars().skip(len - keep).collect();
    format!("{}{}", ELLIPSIS, tail)
}

/// Joins consecutive turns from the same speaker with a newline.
pub fn merge_adjacent(turns: Vec<Turn>) -> Vec<Turn> {
    let mut merged: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns {
        match merged.last_mut() {
            Some(last) if last.speaker == turn.speaker => {
                last.text.push('\n');
                last.text.push_str(&turn.text);
            }
            _ => merged.push(turn),
        }
    }
    merged
}

pub fn build_ask_context_turns(request: &AskContextRequest<'_>) -> Vec<Turn> {
    let mut normalized: Vec<Turn> = request
        .rows
        .iter()
        .map(|row| Turn::new(row.role.speaker_or_learner(), row.content.trim()))
        .filter(|turn| !turn.text.is_empty())
        .collect();

    let latest = request.latest_message.trim();
    if !latest.is_empty() {
        normalized.push(Turn::learner(latest));
    }

    let max_messages = request.max_messages();
    let skip = normalized.len().saturating_sub(max_messages);
    let recent: Vec<Turn> = normalized.into_iter().skip(skip).collect();
    if recent.is_empty() {
        return Vec::new();
    }

    let per_message_budget = (request.max_total_chars / recent.len()).max(1);
    let truncated: Vec<Turn> = recent
        .into_iter()
        .map(|turn| Turn::new(turn.speaker, truncate_keep_tail(&turn.text, per_message_budget)))
        .collect();

    tracing::trace!(
        dropped = skip,
        messages = truncated.len(),
        per_message_budget,
        "assembled ask context"
    );

    merge_adjacent(truncated)
}
