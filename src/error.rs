//! Error types for the parley conversation core.

use thiserror::Error;

use crate::speech::recognizer::RecognitionFault;

/// Parley application errors
#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    /// Speech recognition fault reported by the host engine
    #[error("Speech recognition error: {0}")]
    Transcription(RecognitionFault),

    /// Backend request failure (any endpoint)
    #[error("Backend request failed: {0}")]
    Backend(String),

    /// History export error
    #[error("Export error: {0}")]
    Export(String),

    /// Clipboard write error
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::Export(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    ///
    /// Every conversational failure returns the session to Idle ready for a
    /// new turn. Channel and configuration errors require user intervention
    /// before the application is usable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Recognition faults end the current turn, never the session
            ParleyError::Transcription(_) => true,
            // Backend failures resolve the turn and leave the session usable
            ParleyError::Backend(_) => true,
            // Export and clipboard failures affect only the requested action
            ParleyError::Export(_) => true,
            ParleyError::Clipboard(_) => true,
            // Channel errors indicate internal issues
            ParleyError::Channel(_) => false,
            // Config errors require user intervention
            ParleyError::Config(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    ///
    /// Returns a message suitable for display in the status line.
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::Transcription(fault) => fault.status_message().to_string(),
            ParleyError::Backend(message) => message.clone(),
            ParleyError::Export(message) => message.clone(),
            ParleyError::Clipboard(_) => "Failed to copy to clipboard.".to_string(),
            ParleyError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            ParleyError::Config(_) => "Configuration error. Please check settings.".to_string(),
        }
    }
}

/// Result type alias for parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;
