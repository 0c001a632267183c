//! Host speech-recognition seam and the restartable capture source.
//!
//! Recognition itself is a host capability: an engine runs in continuous
//! mode with interim results and pushes typed events into a channel. The
//! `CaptureSource` wraps an engine with the listening-intent flag and the
//! restart-once rule, so an engine that ends on its own (host engines time
//! out on silence) keeps capturing until the caller actually stops the turn.

use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::transcript::TranscriptSegment;

/// Recognition failure taxonomy reported by host engines.
///
/// None of these is fatal to the session; each ends at most the current
/// turn and carries its own user-visible status line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionFault {
    /// The engine heard nothing it could transcribe
    #[error("no speech detected")]
    NoSpeech,

    /// Microphone or capture-device failure
    #[error("audio capture failure")]
    AudioCapture,

    /// The user denied microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Any other engine-reported failure
    #[error("recognition fault: {0}")]
    Other(String),
}

impl RecognitionFault {
    /// Map a host engine's error code onto the taxonomy
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionFault::NoSpeech,
            "audio-capture" => RecognitionFault::AudioCapture,
            "not-allowed" => RecognitionFault::PermissionDenied,
            other => RecognitionFault::Other(other.to_string()),
        }
    }

    /// User-visible status line for this fault
    pub fn status_message(&self) -> &'static str {
        match self {
            RecognitionFault::NoSpeech => "No speech detected. Please try again.",
            RecognitionFault::AudioCapture => "Microphone issue. Please check your device.",
            RecognitionFault::PermissionDenied => {
                "Microphone access denied. Please allow microphone use."
            }
            RecognitionFault::Other(_) => "Speech recognition error. Please try again.",
        }
    }
}

/// Events delivered by a recognition engine, in arrival order
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// One result chunk, interim or final
    Segment(TranscriptSegment),

    /// Engine-reported fault; the engine may keep running after one
    Fault(RecognitionFault),

    /// The engine stopped capturing, requested or not
    Ended,
}

/// Host recognition engine seam.
///
/// Implementations run continuous recognition with interim results and
/// deliver `RecognitionEvent`s on the sender handed to `start`. After a
/// `stop` request the engine must still deliver a final `Ended`.
pub trait RecognitionEngine: Send {
    /// Begin continuous recognition for the given BCP-47 language tag
    fn start(&mut self, language: &str, events: Sender<RecognitionEvent>) -> Result<()>;

    /// Request the engine to stop capturing
    fn stop(&mut self) -> Result<()>;
}

/// What became of an engine end event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Intent was still listening and the engine restarted in place
    Restarted,

    /// The end followed a requested stop
    StoppedByRequest,

    /// Intent was listening but the restart call failed; intent dropped
    Failed(String),
}

/// Restartable wrapper around a recognition engine.
///
/// Tracks the caller's listening intent separately from the engine's own
/// lifecycle. On an unexpected end it attempts exactly one restart per end
/// event, keeping the already-accumulated transcript intact (the transcript
/// lives upstream in the session state, fed by segment events).
pub struct CaptureSource {
    engine: Box<dyn RecognitionEngine>,
    event_tx: Sender<RecognitionEvent>,
    listening: bool,
    language: String,
}

impl CaptureSource {
    /// Wrap an engine, returning the source and the event receiver the
    /// orchestrator selects on
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        buffer_size: usize,
    ) -> (Self, Receiver<RecognitionEvent>) {
        let (event_tx, event_rx) = bounded(buffer_size);
        (
            Self {
                engine,
                event_tx,
                listening: false,
                language: String::new(),
            },
            event_rx,
        )
    }

    /// Whether the caller still intends to capture
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Start capturing with the given language tag
    pub fn start(&mut self, language: &str) -> Result<()> {
        self.engine.start(language, self.event_tx.clone())?;
        self.listening = true;
        self.language = language.to_string();
        info!("recognition started (language: {})", language);
        Ok(())
    }

    /// Drop the listening intent and ask the engine to stop.
    ///
    /// The engine's eventual `Ended` then resolves to `StoppedByRequest`.
    pub fn request_stop(&mut self) -> Result<()> {
        self.listening = false;
        self.engine.stop()?;
        debug!("recognition stop requested");
        Ok(())
    }

    /// Handle an `Ended` event from the engine.
    ///
    /// While intent is listening this attempts one restart with the same
    /// language; a failed restart drops the intent so the turn can degrade
    /// cleanly instead of looping.
    pub fn handle_ended(&mut self) -> RestartOutcome {
        if !self.listening {
            return RestartOutcome::StoppedByRequest;
        }

        let language = self.language.clone();
        match self.engine.start(&language, self.event_tx.clone()) {
            Ok(()) => {
                info!("recognition ended unexpectedly, restarted in place");
                RestartOutcome::Restarted
            }
            Err(e) => {
                warn!("recognition restart failed: {}", e);
                self.listening = false;
                RestartOutcome::Failed(e.to_string())
            }
        }
    }
}
