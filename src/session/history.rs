//! Chat history: entries, word counting, and the shared append-only log.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Recorded and submitted for a turn where nothing was transcribed
pub const EMPTY_UTTERANCE_PLACEHOLDER: &str = "Sorry, I didn't catch that. Could you try again?";

/// Who produced a history entry. Serialized with the wire strings the
/// backend export endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "You")]
    User,
    Tutor,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "You"),
            Speaker::Tutor => write!(f, "Tutor"),
        }
    }
}

/// One immutable record of a conversation turn side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub speaker: Speaker,
    pub message: String,
    /// Listening seconds for user entries, speaking seconds for tutor
    /// entries. A tutor entry is appended with 0 and completed once
    /// playback ends.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    #[serde(rename = "wordCount")]
    pub word_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn user(message: impl Into<String>, duration_secs: u64) -> Self {
        let message = message.into();
        Self {
            word_count: word_count(&message),
            speaker: Speaker::User,
            message,
            duration_secs,
            timestamp: Utc::now(),
        }
    }

    /// User entry for a turn that produced no transcript. The placeholder
    /// is shown and submitted, but no words are counted.
    pub fn user_placeholder(duration_secs: u64) -> Self {
        Self {
            word_count: 0,
            speaker: Speaker::User,
            message: EMPTY_UTTERANCE_PLACEHOLDER.to_string(),
            duration_secs,
            timestamp: Utc::now(),
        }
    }

    /// Tutor entry with a pending duration, completed when playback ends
    pub fn tutor(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            word_count: word_count(&message),
            speaker: Speaker::Tutor,
            message,
            duration_secs: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Whitespace-separated token count; empty and whitespace-only text is 0
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Shared append-only conversation log.
///
/// Entries are never reordered or removed. The only permitted mutation of an
/// existing entry is completing the pending duration of the most recent
/// tutor entry.
#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: Arc<RwLock<Vec<ChatEntry>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn append(&self, entry: ChatEntry) {
        self.entries.write().push(entry);
    }

    pub fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries.read().clone()
    }

    /// Write the speaking duration into the last entry, provided it is a
    /// tutor entry. Returns false when the log is empty or the last entry
    /// belongs to the user.
    pub fn complete_pending_reply(&self, duration_secs: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.last_mut() {
            Some(entry) if entry.speaker == Speaker::Tutor => {
                entry.duration_secs = duration_secs;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}
