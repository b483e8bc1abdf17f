use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp::{self, epoch};

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

fn default_interval_days() -> u32 {
    1
}

fn default_ease_factor() -> f64 {
    DEFAULT_EASE_FACTOR
}

// A flashcard. `front` is the English phrase, `back` the learner's native gloss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(alias = "en")]
    pub front: String,
    #[serde(default, alias = "ja")]
    pub back: String,
    #[serde(default = "epoch", deserialize_with = "timestamp::lenient")]
    pub created_at: DateTime<Utc>,
}

// One grading event. Append-only; only the latest per card matters for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(alias = "flashcard_id")]
    pub card_id: String,
    #[serde(default)]
    pub quality: i32,
    #[serde(default)]
    pub repetition: u32,
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,
    #[serde(default = "default_ease_factor")]
    pub ease_factor: f64,
    #[serde(default = "epoch", deserialize_with = "timestamp::lenient")]
    pub reviewed_at: DateTime<Utc>,
    #[serde(default = "epoch", deserialize_with = "timestamp::lenient")]
    pub next_review_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn is_mastered(&self) -> bool {
        self.quality >= 3
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// Who produced a turn of dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Learner,
    Tutor,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Learner => "learner",
            Speaker::Tutor => "tutor",
        }
    }

    // Role name expected by the generative-text API.
    pub fn api_role(&self) -> &'static str {
        match self {
            Speaker::Learner => "user",
            Speaker::Tutor => "model",
        }
    }
}

// Role column of a stored chat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    #[serde(alias = "model")]
    Assistant,
    System,
    #[serde(other)]
    Other,
}

impl MessageRole {
    /// Strict mapping: only user and assistant rows take part in a conversation.
    pub fn speaker(&self) -> Option<Speaker> {
        match self {
            MessageRole::User => Some(Speaker::Learner),
            MessageRole::Assistant => Some(Speaker::Tutor),
            MessageRole::System | MessageRole::Other => None,
        }
    }

    /// Loose mapping used for chat context: anything but the assistant is the learner.
    pub fn speaker_or_learner(&self) -> Speaker {
        match self {
            MessageRole::Assistant => Speaker::Tutor,
            _ => Speaker::Learner,
        }
    }
}

// Which chat surface a message was sent from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Ask,
    Translate,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub mode: ChatMode,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default = "epoch", deserialize_with = "timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

// A prior chat row fed into the ask-mode context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueRow {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }

    pub fn learner(text: impl Into<String>) -> Self {
        Self::new(Speaker::Learner, text)
    }

    pub fn tutor(text: impl Into<String>) -> Self {
        Self::new(Speaker::Tutor, text)
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

// Per-card statistics the profile builder works from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardStat {
    #[serde(alias = "en")]
    pub phrase: String,
    #[serde(default, deserialize_with = "timestamp::lenient_opt")]
    pub next_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wrong_rate_7d: f64,
    #[serde(default = "epoch", deserialize_with = "timestamp::lenient")]
    pub created_at: DateTime<Utc>,
}

// A weighted grammar signal extracted from chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSignal {
    pub signal_key: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningProfile {
    pub review_targets: Vec<String>,
    pub grammar_targets: Vec<String>,
    pub new_candidates: Vec<String>,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod card_tests {
        use super::*;

        #[test]
        fn deserializes_datastore_column_names() {
            let raw = r#"{
                "id": "c1",
                "en": "Hello",
                "ja": "こんにちは",
                "created_at": "2026-02-27T10:00:00.000Z"
            }"#;
            let card: Card = serde_json::from_str(raw).unwrap();
            assert_eq!(card.front, "Hello");
            assert_eq!(card.back, "こんにちは");
            assert_eq!(card.created_at.to_rfc3339(), "2026-02-27T10:00:00+00:00");
        }

        #[test]
        fn missing_created_at_is_epoch() {
            let card: Card = serde_json::from_str(r#"{"id": "c1", "front": "Hi"}"#).unwrap();
            assert_eq!(card.created_at, epoch());
            assert_eq!(card.back, "");
        }
    }

    mod review_record_tests {
        use super::*;

        #[test]
        fn defaults_fill_missing_scheduling_fields() {
            let review: ReviewRecord = serde_json::from_str(
                r#"{"flashcard_id": "c1", "next_review_at": "2026-03-01T00:00:00Z"}"#,
            )
            .unwrap();
            assert_eq!(review.card_id, "c1");
            assert_eq!(review.repetition, 0);
            assert_eq!(review.interval_days, 1);
            assert_eq!(review.ease_factor, DEFAULT_EASE_FACTOR);
            assert_eq!(review.reviewed_at, epoch());
        }

        #[test]
        fn mastered_at_three_and_above() {
            let mut review: ReviewRecord =
                serde_json::from_str(r#"{"card_id": "c1", "quality": 3}"#).unwrap();
            assert!(review.is_mastered());
            review.quality = 2;
            assert!(!review.is_mastered());
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn deserializes_known_and_unknown_roles() {
            let roles: Vec<MessageRole> =
                serde_json::from_str(r#"["user", "assistant", "model", "system", "tool"]"#)
                    .unwrap();
            assert_eq!(
                roles,
                vec![
                    MessageRole::User,
                    MessageRole::Assistant,
                    MessageRole::Assistant,
                    MessageRole::System,
                    MessageRole::Other
                ]
            );
        }

        #[test]
        fn strict_speaker_skips_system() {
            assert_eq!(MessageRole::User.speaker(), Some(Speaker::Learner));
            assert_eq!(MessageRole::Assistant.speaker(), Some(Speaker::Tutor));
            assert_eq!(MessageRole::System.speaker(), None);
            assert_eq!(MessageRole::Other.speaker(), None);
        }

        #[test]
        fn loose_speaker_defaults_to_learner() {
            assert_eq!(MessageRole::System.speaker_or_learner(), Speaker::Learner);
            assert_eq!(MessageRole::Assistant.speaker_or_learner(), Speaker::Tutor);
        }

        #[test]
        fn api_roles() {
            assert_eq!(Speaker::Learner.api_role(), "user");
            assert_eq!(Speaker::Tutor.api_role(), "model");
        }
    }

    mod chat_message_tests {
        use super::*;

        #[test]
        fn unknown_mode_is_other() {
            let raw = r#"{
                "mode": "fixer",
                "role": "user",
                "content": "x",
                "created_at": "2026-02-20T00:00:00Z"
            }"#;
            let msg: ChatMessage = serde_json::from_str(raw).unwrap();
            assert_eq!(msg.mode, ChatMode::Other);
            assert!(msg.thread_id.is_none());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_with_string() {
            let output = JsonOutput::ok("test data");
            assert!(output.success);
            assert_eq!(output.data, Some("test data"));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_with_string() {
            let output = JsonOutput::<()>::err("something went wrong");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("something went wrong".to_string()));
        }

        #[test]
        fn serializes_ok_correctly() {
            let output = JsonOutput::ok("test");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":true"));
            assert!(json.contains("\"data\":\"test\""));
            assert!(json.contains("\"error\":null"));
        }
    }
}
