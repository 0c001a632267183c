//! Unified conversation state for the parley session
//!
//! This module provides a thread-safe shared state that can be accessed by:
//! - **Orchestrator**: Writes state changes based on capture/voice/backend events
//! - **Front-end**: Reads state for rendering, sends commands
//! - **Tests**: Read state for assertions, send commands
//!
//! The design separates:
//! - **State**: Shared data that can be queried synchronously
//! - **Commands**: Requests to change state (sent to orchestrator)
//! - **Events**: Notifications for front-end updates

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::types::ModelEntry;
use crate::session::history::{ChatEntry, EMPTY_UTTERANCE_PLACEHOLDER};
use crate::session::transcript::TranscriptBuffer;

/// Conversation turn-cycle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// Ready for a new turn
    #[default]
    Idle,
    /// Capturing the user's speech
    Listening,
    /// Waiting on the backend reply
    Thinking,
    /// Speaking the reply aloud
    Speaking,
}

impl ConversationState {
    /// Check if ready for a new turn
    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }

    /// Check if capturing speech
    pub fn is_listening(&self) -> bool {
        matches!(self, ConversationState::Listening)
    }

    /// Check if waiting on the backend
    pub fn is_thinking(&self) -> bool {
        matches!(self, ConversationState::Thinking)
    }

    /// Check if speaking a reply
    pub fn is_speaking(&self) -> bool {
        matches!(self, ConversationState::Speaking)
    }

    /// Check if a turn is in flight (not idle)
    pub fn is_active(&self) -> bool {
        !self.is_idle()
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "Idle"),
            ConversationState::Listening => write!(f, "Listening"),
            ConversationState::Thinking => write!(f, "Thinking"),
            ConversationState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Model and language choices, read at submission time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selections {
    /// Selected model id; None until a catalog entry is chosen
    pub model_id: Option<String>,
    /// Selected BCP-47 language tag
    pub language: String,
}

impl Default for Selections {
    fn default() -> Self {
        Self {
            model_id: None,
            language: "en-US".to_string(),
        }
    }
}

impl Selections {
    /// Short display code for the language, e.g. "EN" for "en-US"
    pub fn language_code(&self) -> String {
        self.language
            .split('-')
            .next()
            .unwrap_or(&self.language)
            .to_uppercase()
    }
}

/// A frozen user turn ready for backend submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserTurn {
    pub utterance: String,
    pub duration_secs: u64,
    /// True when the placeholder was substituted for an empty transcript
    pub was_blank: bool,
}

/// Unified session state
///
/// This is the single source of truth for the conversation turn cycle.
/// It can be shared across threads using `SharedSession`.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Current turn-cycle state
    pub conversation: ConversationState,
    /// Transcript accumulation for the active listening phase
    pub transcript: TranscriptBuffer,
    /// Current model/language choices
    pub selections: Selections,
    /// Transient status line (if any)
    pub status: Option<String>,
    /// When the active listening phase began
    pub listen_started: Option<Instant>,
    /// When the active speaking phase began
    pub speak_started: Option<Instant>,
}

fn rounded_secs(since: Instant) -> u64 {
    since.elapsed().as_secs_f64().round() as u64
}

impl SessionState {
    /// Create a new default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an immutable snapshot of current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation: self.conversation,
            accumulated_text: self.transcript.accumulated_text(),
            interim_text: self.transcript.interim_text().to_string(),
            selections: self.selections.clone(),
            status: self.status.clone(),
        }
    }

    /// Set a transient status line
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    /// Clear the status line
    pub fn clear_status(&mut self) {
        self.status = None;
    }

    // === State transitions ===

    /// Begin a listening phase: fresh transcript, fresh status, timer armed
    pub fn begin_listening(&mut self) {
        self.conversation = ConversationState::Listening;
        self.transcript.reset();
        self.clear_status();
        self.listen_started = Some(Instant::now());
    }

    /// End the listening phase and freeze the turn.
    ///
    /// The accumulated transcript becomes the utterance, with the fixed
    /// placeholder substituted when nothing was transcribed. The accumulator
    /// is cleared and the state moves to Thinking.
    pub fn finish_listening(&mut self) -> UserTurn {
        let accumulated = self.transcript.take();
        let was_blank = accumulated.is_empty();
        let utterance = if was_blank {
            EMPTY_UTTERANCE_PLACEHOLDER.to_string()
        } else {
            accumulated
        };
        let duration_secs = self.listen_started.take().map(rounded_secs).unwrap_or(0);
        self.conversation = ConversationState::Thinking;

        UserTurn {
            utterance,
            duration_secs,
            was_blank,
        }
    }

    /// Abandon the listening phase without a submission
    pub fn abort_listening(&mut self) {
        self.conversation = ConversationState::Idle;
        self.transcript.reset();
        self.listen_started = None;
    }

    /// Enter Thinking directly (typed turns skip the listening phase)
    pub fn begin_thinking(&mut self) {
        self.conversation = ConversationState::Thinking;
        self.clear_status();
    }

    /// The backend failed; resolve the turn back to Idle
    pub fn abort_thinking(&mut self) {
        self.conversation = ConversationState::Idle;
    }

    /// The reply arrived; enter Speaking with the timer armed
    pub fn begin_speaking(&mut self) {
        self.conversation = ConversationState::Speaking;
        self.speak_started = Some(Instant::now());
    }

    /// Playback ended; return the speaking duration and resolve to Idle
    pub fn finish_speaking(&mut self) -> u64 {
        let duration = self.speak_started.take().map(rounded_secs).unwrap_or(0);
        self.conversation = ConversationState::Idle;
        duration
    }
}

/// Immutable snapshot of session state
///
/// Used for thread-safe reads without holding locks.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub conversation: ConversationState,
    pub accumulated_text: String,
    pub interim_text: String,
    pub selections: Selections,
    pub status: Option<String>,
}

/// Thread-safe shared session state
///
/// This wraps `SessionState` in `Arc<RwLock<>>` for safe concurrent access.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionState>>,
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSession {
    /// Create a new shared session state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::new())),
        }
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.inner.read()
    }

    /// Get a write lock on the state
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.inner.write()
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot()
    }

    // === Convenience read methods ===

    /// Current turn-cycle state
    pub fn conversation(&self) -> ConversationState {
        self.inner.read().conversation
    }

    /// Check if ready for a new turn
    pub fn is_idle(&self) -> bool {
        self.inner.read().conversation.is_idle()
    }

    /// Check if capturing speech
    pub fn is_listening(&self) -> bool {
        self.inner.read().conversation.is_listening()
    }

    /// Check if waiting on the backend
    pub fn is_thinking(&self) -> bool {
        self.inner.read().conversation.is_thinking()
    }

    /// Check if speaking a reply
    pub fn is_speaking(&self) -> bool {
        self.inner.read().conversation.is_speaking()
    }

    /// Current status line
    pub fn status(&self) -> Option<String> {
        self.inner.read().status.clone()
    }

    /// Current selections
    pub fn selections(&self) -> Selections {
        self.inner.read().selections.clone()
    }
}

/// Commands that can be sent to control the session
///
/// These are processed by the orchestrator and result in state changes.
#[derive(Clone, Debug)]
pub enum SessionCommand {
    /// Begin a listening turn
    StartListening,
    /// End the listening phase and submit the turn
    StopListening,
    /// Cancel reply playback
    StopSpeaking,
    /// Submit a typed turn (bypasses listening)
    SubmitText(String),
    /// Choose a model from the loaded catalog
    SelectModel(String),
    /// Choose a recognition/response language
    SelectLanguage(String),
    /// Load the model catalog
    RefreshModels,
    /// Load the current system prompt
    FetchSystemPrompt,
    /// Replace the system prompt
    SaveSystemPrompt(String),
    /// Export history through the backend
    ExportHistory,
    /// Shutdown all workers
    Shutdown,
}

/// Events emitted by the session
///
/// These drive front-end updates. Durable state should be queried from
/// `SharedSession` and the `ChatLog` rather than reconstructed from events.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The turn-cycle state changed
    StateChanged(ConversationState),
    /// Live transcript preview (accumulated plus pending interim)
    Interim(String),
    /// A user entry was appended to the history
    TurnRecorded(ChatEntry),
    /// A tutor entry was appended to the history
    ReplyRecorded(ChatEntry),
    /// Playback ended and the pending tutor duration was written
    ReplyFinished { duration_secs: u64 },
    /// Transient status line
    Status(String),
    /// Model catalog arrived
    Models(Vec<ModelEntry>),
    /// Current system prompt arrived
    SystemPrompt(String),
    /// The system prompt was saved
    SystemPromptSaved,
    /// Exported document bytes arrived
    HistoryExported(Vec<u8>),
    /// Error surfaced to the user
    Error(String),
    /// Shutdown complete
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn turn_cycle_transitions() {
        let mut state = SessionState::new();
        assert!(state.conversation.is_idle());

        state.begin_listening();
        assert!(state.conversation.is_listening());
        assert!(state.listen_started.is_some());

        let turn = state.finish_listening();
        assert!(state.conversation.is_thinking());
        assert_eq!(turn.utterance, EMPTY_UTTERANCE_PLACEHOLDER);
        assert!(turn.was_blank);

        state.begin_speaking();
        assert!(state.conversation.is_speaking());

        state.finish_speaking();
        assert!(state.conversation.is_idle());
    }

    #[test]
    fn finish_listening_freezes_accumulated_transcript() {
        let mut state = SessionState::new();
        state.begin_listening();
        state.transcript.push_final("hello");
        state.transcript.push_final("there");
        state.transcript.set_interim("and mo");

        let turn = state.finish_listening();
        assert_eq!(turn.utterance, "hello there");
        // the accumulator is cleared by the freeze
        assert!(state.transcript.is_empty());
        assert_eq!(state.transcript.interim_text(), "");
    }

    #[test]
    fn finish_listening_measures_rounded_seconds() {
        let mut state = SessionState::new();
        state.begin_listening();
        state.listen_started = Some(Instant::now() - Duration::from_millis(2_800));
        state.transcript.push_final("hello");

        let turn = state.finish_listening();
        assert_eq!(turn.duration_secs, 3);
        assert!(state.listen_started.is_none());
    }

    #[test]
    fn empty_turn_gets_the_placeholder() {
        let mut state = SessionState::new();
        state.begin_listening();
        state.transcript.set_interim("never committed");

        let turn = state.finish_listening();
        assert_eq!(turn.utterance, EMPTY_UTTERANCE_PLACEHOLDER);
    }

    #[test]
    fn begin_listening_clears_stale_state() {
        let mut state = SessionState::new();
        state.transcript.push_final("stale");
        state.set_status("old status");

        state.begin_listening();
        assert!(state.transcript.is_empty());
        assert!(state.status.is_none());
    }

    #[test]
    fn abort_listening_returns_to_idle_without_a_turn() {
        let mut state = SessionState::new();
        state.begin_listening();
        state.transcript.push_final("half a");

        state.abort_listening();
        assert!(state.conversation.is_idle());
        assert!(state.transcript.is_empty());
        assert!(state.listen_started.is_none());
    }

    #[test]
    fn abort_thinking_returns_to_idle() {
        let mut state = SessionState::new();
        state.begin_thinking();
        assert!(state.conversation.is_thinking());

        state.abort_thinking();
        assert!(state.conversation.is_idle());
    }

    #[test]
    fn finish_speaking_measures_rounded_seconds() {
        let mut state = SessionState::new();
        state.begin_speaking();
        state.speak_started = Some(Instant::now() - Duration::from_millis(5_400));

        assert_eq!(state.finish_speaking(), 5);
        assert!(state.conversation.is_idle());
        assert!(state.speak_started.is_none());
    }

    #[test]
    fn selections_default_to_english_with_no_model() {
        let selections = Selections::default();
        assert_eq!(selections.language, "en-US");
        assert!(selections.model_id.is_none());
        assert_eq!(selections.language_code(), "EN");
    }

    #[test]
    fn language_code_takes_the_primary_subtag() {
        let selections = Selections {
            model_id: None,
            language: "zh-CN".to_string(),
        };
        assert_eq!(selections.language_code(), "ZH");
    }

    #[test]
    fn shared_session_reads_through() {
        let shared = SharedSession::new();
        assert!(shared.is_idle());

        {
            let mut state = shared.write();
            state.begin_listening();
        }
        assert!(shared.is_listening());
        assert!(!shared.is_idle());

        let snapshot = shared.snapshot();
        assert!(snapshot.conversation.is_listening());
    }

    #[test]
    fn snapshot_is_independent() {
        let shared = SharedSession::new();
        let snapshot1 = shared.snapshot();
        assert!(snapshot1.conversation.is_idle());

        {
            shared.write().begin_listening();
        }

        assert!(snapshot1.conversation.is_idle());
        assert!(shared.snapshot().conversation.is_listening());
    }

    #[test]
    fn state_display_names() {
        assert_eq!(ConversationState::Idle.to_string(), "Idle");
        assert_eq!(ConversationState::Listening.to_string(), "Listening");
        assert_eq!(ConversationState::Thinking.to_string(), "Thinking");
        assert_eq!(ConversationState::Speaking.to_string(), "Speaking");
    }
}
