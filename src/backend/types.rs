//! Wire types for the tutor backend's REST surface.

use serde::{Deserialize, Serialize};

use crate::session::history::ChatEntry;

/// One row of the backend's model catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Provider-scoped model id, e.g. "google/gemini-2.5-flash-lite"
    pub id: String,
    /// Display name, e.g. "Gemini 2.5 Flash Lite (Fast)"
    pub name: String,
    /// Backend-designated default selection
    #[serde(rename = "isDefault", default)]
    pub is_default: bool,
}

/// Body of POST /chat
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub user_input: &'a str,
    pub model: &'a str,
    pub language: &'a str,
}

/// Body of a 2xx /chat response. The backend answers with either field;
/// a populated `error` on a success status is passed through as the reply.
#[derive(Debug, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of GET /system-prompt
#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub prompt: String,
}

/// Body of POST /system-prompt
#[derive(Debug, Serialize)]
pub struct SavePromptRequest<'a> {
    pub prompt: &'a str,
}

/// Outcome of POST /system-prompt
#[derive(Debug, Deserialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of POST /export
#[derive(Debug, Serialize)]
pub struct ExportRequest<'a> {
    pub history: &'a [ChatEntry],
}

/// Error envelope the backend attaches to failure statuses
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
