//! Scheduling core for an English-learning app: SM-2 grading, the review
//! queue, bounded chat context, reading-conversation assembly and the learning
//! profile that steers passage generation.

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod models;
pub mod profile;
pub mod queue;
pub mod sm2;
pub mod snapshot;
pub mod timestamp;

pub use config::Config;
pub use context::{build_ask_context_turns, AskContextRequest};
pub use conversation::{build_reading_conversation, ReadingConversation, ReadingRequest};
pub use error::{LearnloopError, Result};
pub use models::{
    Card, ChatMessage, ChatSignal, DialogueRow, FlashcardStat, LearningProfile, ReviewRecord,
    Speaker, Turn,
};
pub use profile::{build_learning_profile, calc_coverage, choose_targets, GenerationGate};
pub use queue::{build_review_queue, QueueRequest, ReviewQueue};
pub use sm2::{next_sm2, schedule_review, Grade, Sm2Input, Sm2Output};
