//! Parley - Turn-based voice tutor conversation core
//!
//! This crate provides the conversational core of a voice-driven language
//! tutor: a strict turn cycle (listen, think, speak), transcript
//! accumulation from a host recognition engine, spoken replies through a
//! host synthesizer, and a REST backend for chat, model selection, system
//! prompt management and history export.

pub mod backend;
pub mod error;
pub mod export;
pub mod session;
pub mod speech;

// Re-export error types
pub use error::{ParleyError, Result};

// Re-export session types
pub use session::{
    ChatEntry, ChatLog, ConversationState, Selections, Session, SessionCommand, SessionConfig,
    SessionEvent, SessionHandle, SessionSnapshot, SharedSession, Speaker, TranscriptBuffer,
    TranscriptSegment,
};

// Re-export host capability seams
pub use speech::{RecognitionEngine, SpeechSynthesizer};
