//! Speech capture and output.
//!
//! This module provides:
//! - The host recognition-engine seam and the restartable capture source
//! - The host synthesizer seam and the voice output pipeline
//! - Language detection and voice selection

pub mod recognizer;
pub mod synthesizer;
pub mod voices;

// Re-export commonly used types
pub use recognizer::{
    CaptureSource, RecognitionEngine, RecognitionEvent, RecognitionFault, RestartOutcome,
};
pub use synthesizer::{SpeechSynthesizer, Utterance, VoiceCommand, VoiceEvent, VoicePipeline};
pub use voices::{detect_language, pick_voice, SpokenLanguage, VoiceInfo};
