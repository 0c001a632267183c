//! Tutor backend access.
//!
//! This module provides:
//! - The `Backend` trait covering the five REST operations
//! - The reqwest-based `HttpBackend` implementation
//! - A worker thread that runs requests off the orchestrator loop

pub mod client;
pub mod types;
pub mod worker;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::history::ChatEntry;

pub use client::HttpBackend;
pub use types::{ChatReply, ChatRequest, ExportRequest, ModelEntry, PromptBody, SaveOutcome};
pub use worker::{BackendCommand, BackendEvent, BackendHandle, BackendOp, BackendRunner};

/// The tutor backend's REST surface.
///
/// Every operation maps failures onto the single uniform backend error;
/// callers decide how a failure is surfaced. Implementations must not
/// retry.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the model catalog
    async fn models(&self) -> Result<Vec<ModelEntry>>;

    /// Fetch the current system prompt
    async fn system_prompt(&self) -> Result<String>;

    /// Replace the system prompt
    async fn save_system_prompt(&self, prompt: &str) -> Result<()>;

    /// Submit one chat turn and return the tutor's reply text
    async fn chat(&self, user_input: &str, model: &str, language: &str) -> Result<String>;

    /// Render the history to an export document through the backend
    async fn export(&self, history: &[ChatEntry]) -> Result<Vec<u8>>;
}
