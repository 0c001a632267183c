//! Session modules for the conversation turn cycle
//!
//! This module contains the conversational core:
//! - Transcript accumulation for the listening phase
//! - The append-only chat history
//! - Shared session state, commands and events
//! - The orchestrator running the turn cycle

pub mod history;
pub mod orchestrator;
pub mod state;
pub mod transcript;

// Re-export commonly used types
pub use history::{word_count, ChatEntry, ChatLog, Speaker, EMPTY_UTTERANCE_PLACEHOLDER};
pub use orchestrator::{Session, SessionConfig, SessionHandle};
pub use state::{
    ConversationState, Selections, SessionCommand, SessionEvent, SessionSnapshot, SessionState,
    SharedSession, UserTurn,
};
pub use transcript::{TranscriptBuffer, TranscriptSegment};
