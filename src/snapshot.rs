//! JSON snapshots handed to the CLI by the application that owns the data.

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Card, ChatMessage, ChatSignal, DialogueRow, ReviewRecord};

/// Cards plus their review history, as needed by the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSnapshot {
    pub cards: Vec<Card>,
    pub reviews: Vec<ReviewRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewLog {
    pub reviews: Vec<ReviewRecord>,
}

impl ReviewLog {
    pub fn latest_for(&self, card_id: &str) -> Option<&ReviewRecord> {
        crate::queue::latest_reviews(&self.reviews).get(card_id).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySnapshot {
    pub chat_messages: Vec<ChatMessage>,
    pub flashcards: Vec<Card>,
    pub flashcard_reviews: Vec<ReviewRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSnapshot {
    pub cards: Vec<Card>,
    pub reviews: Vec<ReviewRecord>,
    pub signals: Vec<ChatSignal>,
}

/// Dialogue rows are accepted either bare or wrapped as `{"rows": [...]}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RowsFile {
    Bare(Vec<DialogueRow>),
    Wrapped { rows: Vec<DialogueRow> },
}

impl RowsFile {
    pub fn into_rows(self) -> Vec<DialogueRow> {
        match self {
            RowsFile::Bare(rows) | RowsFile::Wrapped { rows } => rows,
        }
    }
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Reads a snapshot from `path`, or from stdin when `path` is `-`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    tracing::debug!(path = %path.display(), bytes = raw.len(), "read snapshot");
    parse_json(&raw)
}
