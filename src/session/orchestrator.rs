//! Session orchestrator coordinating the conversation turn cycle
//!
//! This module provides the main orchestrator that coordinates all concurrent
//! pieces of a conversation session:
//! - Speech capture (recognition engine events)
//! - Speech output (voice pipeline)
//! - Backend requests (chat, settings, export)
//!
//! The orchestrator uses a shared `SessionState` that can be queried by:
//! - Front-end for rendering
//! - Tests for assertions
//!
//! State changes are made by the orchestrator in response to:
//! - External commands (from the front-end or tests)
//! - Internal worker events (transcript segments, playback completion,
//!   backend replies)
//!
//! Everything runs on one loop thread, so per turn the user entry is always
//! recorded before the reply entry, and the reply entry before its duration
//! completes.

use crate::backend::client::HttpBackend;
use crate::backend::types::ModelEntry;
use crate::backend::worker::{BackendCommand, BackendEvent, BackendOp, BackendRunner};
use crate::backend::Backend;
use crate::error::{ParleyError, Result};
use crate::session::history::{ChatEntry, ChatLog};
use crate::session::state::{ConversationState, SessionCommand, SessionEvent, SharedSession};
use crate::speech::recognizer::{
    CaptureSource, RecognitionEngine, RecognitionEvent, RecognitionFault, RestartOutcome,
};
use crate::speech::synthesizer::{SpeechSynthesizer, VoiceCommand, VoiceEvent, VoicePipeline};
use crate::speech::voices::SpokenLanguage;
use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for a conversation session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the tutor backend
    pub backend_url: String,
    /// Initial recognition/response language tag
    pub language: String,
    /// Per-request timeout for backend calls, in seconds
    pub request_timeout_secs: u64,
    /// Channel buffer size
    pub channel_buffer_size: usize,
    /// Shutdown timeout in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            language: "en-US".to_string(),
            request_timeout_secs: 30,
            channel_buffer_size: 100,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend base URL
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// Set the initial language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the per-request backend timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set the channel buffer size
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout_ms(mut self, timeout: u64) -> Self {
        self.shutdown_timeout_ms = timeout;
        self
    }
}

/// Handle for controlling the session from the front-end or tests
///
/// This provides the public interface for:
/// - Sending commands
/// - Receiving events (for front-end updates)
/// - Querying state (via `SharedSession`) and history (via `ChatLog`)
pub struct SessionHandle {
    /// Command sender for controlling the session
    command_tx: Sender<SessionCommand>,
    /// Event receiver for front-end notifications
    event_rx: Receiver<SessionEvent>,
    /// Shared session state (for direct queries)
    state: SharedSession,
    /// Shared conversation log (for direct queries)
    history: ChatLog,
}

impl SessionHandle {
    /// Send a command to the session
    pub fn send_command(&self, cmd: SessionCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ParleyError::Channel(format!("Failed to send command: {}", e)))
    }

    /// Begin a listening turn
    pub fn start_listening(&self) -> Result<()> {
        self.send_command(SessionCommand::StartListening)
    }

    /// End the listening phase and submit the turn
    pub fn stop_listening(&self) -> Result<()> {
        self.send_command(SessionCommand::StopListening)
    }

    /// Cancel reply playback
    pub fn stop_speaking(&self) -> Result<()> {
        self.send_command(SessionCommand::StopSpeaking)
    }

    /// Submit a typed turn
    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(SessionCommand::SubmitText(text.into()))
    }

    /// Choose a model from the loaded catalog
    pub fn select_model(&self, id: impl Into<String>) -> Result<()> {
        self.send_command(SessionCommand::SelectModel(id.into()))
    }

    /// Choose a recognition/response language
    pub fn select_language(&self, tag: impl Into<String>) -> Result<()> {
        self.send_command(SessionCommand::SelectLanguage(tag.into()))
    }

    /// Reload the model catalog
    pub fn refresh_models(&self) -> Result<()> {
        self.send_command(SessionCommand::RefreshModels)
    }

    /// Load the current system prompt
    pub fn fetch_system_prompt(&self) -> Result<()> {
        self.send_command(SessionCommand::FetchSystemPrompt)
    }

    /// Replace the system prompt
    pub fn save_system_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        self.send_command(SessionCommand::SaveSystemPrompt(prompt.into()))
    }

    /// Export history through the backend
    pub fn export_history(&self) -> Result<()> {
        self.send_command(SessionCommand::ExportHistory)
    }

    /// Request shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(SessionCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> Result<SessionEvent> {
        self.event_rx
            .recv()
            .map_err(|e| ParleyError::Channel(format!("Failed to receive event: {}", e)))
    }

    /// Get the shared session state
    ///
    /// This can be used to query state directly without events.
    pub fn state(&self) -> &SharedSession {
        &self.state
    }

    /// Get the shared conversation log
    pub fn history(&self) -> &ChatLog {
        &self.history
    }

    // === Convenience state query methods ===

    /// Current turn-cycle state
    pub fn conversation(&self) -> ConversationState {
        self.state.conversation()
    }

    /// Check if ready for a new turn
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Check if capturing speech
    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    /// Check if waiting on the backend
    pub fn is_thinking(&self) -> bool {
        self.state.is_thinking()
    }

    /// Check if speaking a reply
    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    /// Current status line
    pub fn status(&self) -> Option<String> {
        self.state.status()
    }
}

/// Main orchestrator for one conversation session
///
/// The session manages the lifecycle of:
/// - A capture source wrapping the recognition engine
/// - A voice pipeline wrapping the speech synthesizer
/// - A backend worker for HTTP requests
///
/// It routes events between these components, updates shared state and the
/// conversation log, and emits events for front-end notifications.
///
/// Recognition engine and synthesizer are host capabilities injected with
/// `set_recognizer` / `set_synthesizer` before `start()`. Without a
/// recognizer, listening turns are rejected with a status line; without a
/// synthesizer, replies complete immediately with a zero speaking duration.
pub struct Session {
    config: SessionConfig,

    // Shared state
    state: SharedSession,
    history: ChatLog,

    // Channels for external communication
    command_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,

    // Injected host capabilities and backend
    backend: Arc<dyn Backend>,
    recognizer: Option<Box<dyn RecognitionEngine>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
}

impl Session {
    /// Create a new session with the given configuration
    ///
    /// Returns the session and a handle for controlling it. The session must
    /// be started with `start()` to begin processing.
    pub fn new(config: SessionConfig) -> Result<(Self, SessionHandle)> {
        if SpokenLanguage::from_tag(&config.language).is_none() {
            return Err(ParleyError::Config(format!(
                "Unsupported language: {}",
                config.language
            )));
        }

        let buffer_size = config.channel_buffer_size;

        // Create shared state and the conversation log
        let state = SharedSession::new();
        state.write().selections.language = config.language.clone();
        let history = ChatLog::new();

        // Create external communication channels
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);

        // Default backend; replace with set_backend for tests
        let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(
            &config.backend_url,
            Duration::from_secs(config.request_timeout_secs),
        )?);

        let handle = SessionHandle {
            command_tx,
            event_rx,
            state: state.clone(),
            history: history.clone(),
        };

        let session = Self {
            config,
            state,
            history,
            command_rx,
            event_tx,
            backend,
            recognizer: None,
            synthesizer: None,
        };

        Ok((session, handle))
    }

    /// Install the host recognition engine
    pub fn set_recognizer(&mut self, engine: Box<dyn RecognitionEngine>) {
        self.recognizer = Some(engine);
    }

    /// Install the host speech synthesizer
    pub fn set_synthesizer(&mut self, synthesizer: Box<dyn SpeechSynthesizer>) {
        self.synthesizer = Some(synthesizer);
    }

    /// Replace the backend implementation
    pub fn set_backend(&mut self, backend: Arc<dyn Backend>) {
        self.backend = backend;
    }

    /// Start the session and all workers
    ///
    /// This consumes the session and returns join handles for all worker
    /// threads. The session runs in its own thread and coordinates the
    /// capture source, voice pipeline and backend worker.
    pub fn start(mut self) -> Result<Vec<JoinHandle<()>>> {
        let buffer_size = self.config.channel_buffer_size;
        let mut handles = Vec::new();

        // Wrap the recognition engine, if one was installed. The never()
        // receiver keeps the select arm permanently quiet otherwise.
        let (capture, capture_rx) = match self.recognizer.take() {
            Some(engine) => {
                let (source, rx) = CaptureSource::new(engine, buffer_size);
                info!("Capture source ready");
                (Some(source), rx)
            }
            None => (None, never()),
        };

        // Start the voice pipeline worker, if a synthesizer was installed
        let (voice_command_tx, voice_event_rx) = match self.synthesizer.take() {
            Some(synthesizer) => {
                let pipeline = VoicePipeline::new(buffer_size);
                let command_tx = pipeline.command_sender();
                let event_rx = pipeline.event_receiver();
                handles.push(pipeline.start_worker(synthesizer)?);
                info!("Voice pipeline worker started");
                (Some(command_tx), event_rx)
            }
            None => (None, never()),
        };

        // Start the backend worker
        let backend_handle = BackendRunner::new(Arc::clone(&self.backend), buffer_size)
            .start_worker()?;
        info!("Backend worker started");
        let backend_command_tx = backend_handle.command_tx;
        let backend_event_rx = backend_handle.event_rx;

        // Load the model catalog up front so a default selection is ready
        // before the first turn
        if let Err(e) = backend_command_tx.send(BackendCommand::FetchModels) {
            warn!("Failed to request model catalog: {}", e);
        }

        // Start the main session loop
        let loop_handle = self.run_session_loop(
            capture,
            capture_rx,
            voice_command_tx,
            voice_event_rx,
            backend_command_tx,
            backend_event_rx,
        );
        handles.push(loop_handle);
        info!("Session loop started");

        Ok(handles)
    }

    /// Run the main session event loop
    fn run_session_loop(
        self,
        mut capture: Option<CaptureSource>,
        capture_rx: Receiver<RecognitionEvent>,
        voice_command_tx: Option<Sender<VoiceCommand>>,
        voice_event_rx: Receiver<VoiceEvent>,
        backend_command_tx: Sender<BackendCommand>,
        backend_event_rx: Receiver<BackendEvent>,
    ) -> JoinHandle<()> {
        let state = self.state;
        let history = self.history;
        let command_rx = self.command_rx;
        let event_tx = self.event_tx;
        let shutdown_timeout = Duration::from_millis(self.config.shutdown_timeout_ms);

        thread::spawn(move || {
            info!("Session main loop starting");

            // Loaded model catalog, for validating selections
            let mut catalog: Vec<ModelEntry> = Vec::new();
            // Id of the chat turn awaiting a reply
            let mut active_turn: Option<Uuid> = None;
            // Id of the utterance currently playing
            let mut speaking: Option<Uuid> = None;

            loop {
                select! {
                    // Handle external commands
                    recv(command_rx) -> cmd => {
                        match cmd {
                            Ok(SessionCommand::StartListening) => {
                                let can_start = state.read().conversation.is_idle();
                                if !can_start {
                                    warn!("Cannot start listening: not in idle state");
                                    let message = "A turn is already in progress.".to_string();
                                    state.write().set_status(message.clone());
                                    let _ = event_tx.send(SessionEvent::Status(message));
                                } else if let Some(source) = capture.as_mut() {
                                    let language = state.read().selections.language.clone();
                                    match source.start(&language) {
                                        Ok(()) => {
                                            state.write().begin_listening();
                                            let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Listening));
                                            debug!("Listening started ({})", language);
                                        }
                                        Err(e) => {
                                            error!("Failed to start recognition: {}", e);
                                            let message = e.user_message();
                                            state.write().set_status(message.clone());
                                            let _ = event_tx.send(SessionEvent::Error(message));
                                        }
                                    }
                                } else {
                                    warn!("Cannot start listening: no recognition engine installed");
                                    let message = "Speech recognition is not available.".to_string();
                                    state.write().set_status(message.clone());
                                    let _ = event_tx.send(SessionEvent::Status(message));
                                }
                            }

                            Ok(SessionCommand::StopListening) => {
                                let can_stop = state.read().conversation.is_listening();
                                if !can_stop {
                                    warn!("Cannot stop listening: not in listening state");
                                } else {
                                    if let Some(source) = capture.as_mut() {
                                        if let Err(e) = source.request_stop() {
                                            // the turn still resolves below
                                            error!("Failed to stop recognition: {}", e);
                                        }
                                    }

                                    let turn = state.write().finish_listening();
                                    let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Thinking));
                                    debug!("Turn frozen after {}s: {}", turn.duration_secs, turn.utterance);

                                    // a blank turn still goes to the model, but counts no words
                                    let entry = if turn.was_blank {
                                        ChatEntry::user_placeholder(turn.duration_secs)
                                    } else {
                                        ChatEntry::user(&turn.utterance, turn.duration_secs)
                                    };
                                    history.append(entry.clone());
                                    let _ = event_tx.send(SessionEvent::TurnRecorded(entry));

                                    let turn_id = Uuid::new_v4();
                                    active_turn = Some(turn_id);
                                    let selections = state.read().selections.clone();
                                    let submitted = backend_command_tx.send(BackendCommand::Chat {
                                        turn: turn_id,
                                        user_input: turn.utterance,
                                        model: selections.model_id.unwrap_or_default(),
                                        language: selections.language,
                                    });
                                    if let Err(e) = submitted {
                                        error!("Failed to submit chat turn: {}", e);
                                        active_turn = None;
                                        state.write().abort_thinking();
                                        let message = ParleyError::Channel(e.to_string()).user_message();
                                        let _ = event_tx.send(SessionEvent::Error(message));
                                        let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                    }
                                }
                            }

                            Ok(SessionCommand::StopSpeaking) => {
                                let is_speaking = state.read().conversation.is_speaking();
                                if is_speaking {
                                    if let Some(tx) = &voice_command_tx {
                                        if let Err(e) = tx.send(VoiceCommand::Stop) {
                                            error!("Failed to send stop to voice pipeline: {}", e);
                                        }
                                        debug!("Playback stop requested");
                                    }
                                } else {
                                    warn!("Cannot stop speaking: not in speaking state");
                                }
                            }

                            Ok(SessionCommand::SubmitText(text)) => {
                                let can_submit = state.read().conversation.is_idle();
                                let trimmed = text.trim().to_string();
                                if !can_submit {
                                    warn!("Cannot submit text: a turn is already in flight");
                                    let message = "A turn is already in progress.".to_string();
                                    state.write().set_status(message.clone());
                                    let _ = event_tx.send(SessionEvent::Status(message));
                                } else if trimmed.is_empty() {
                                    debug!("Ignoring empty typed turn");
                                    let message = "Nothing to send.".to_string();
                                    state.write().set_status(message.clone());
                                    let _ = event_tx.send(SessionEvent::Status(message));
                                } else {
                                    state.write().begin_thinking();
                                    let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Thinking));

                                    // typed turns carry no listening time
                                    let entry = ChatEntry::user(&trimmed, 0);
                                    history.append(entry.clone());
                                    let _ = event_tx.send(SessionEvent::TurnRecorded(entry));

                                    let turn_id = Uuid::new_v4();
                                    active_turn = Some(turn_id);
                                    let selections = state.read().selections.clone();
                                    let submitted = backend_command_tx.send(BackendCommand::Chat {
                                        turn: turn_id,
                                        user_input: trimmed,
                                        model: selections.model_id.unwrap_or_default(),
                                        language: selections.language,
                                    });
                                    if let Err(e) = submitted {
                                        error!("Failed to submit chat turn: {}", e);
                                        active_turn = None;
                                        state.write().abort_thinking();
                                        let message = ParleyError::Channel(e.to_string()).user_message();
                                        let _ = event_tx.send(SessionEvent::Error(message));
                                        let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                    }
                                }
                            }

                            Ok(SessionCommand::SelectModel(id)) => {
                                if catalog.iter().any(|m| m.id == id) {
                                    debug!("Model selected: {}", id);
                                    state.write().selections.model_id = Some(id);
                                } else {
                                    warn!("Rejecting model not in the loaded catalog: {}", id);
                                    let _ = event_tx.send(SessionEvent::Error(format!("Unknown model: {}", id)));
                                }
                            }

                            Ok(SessionCommand::SelectLanguage(tag)) => {
                                if SpokenLanguage::from_tag(&tag).is_some() {
                                    debug!("Language selected: {}", tag);
                                    state.write().selections.language = tag;
                                } else {
                                    warn!("Rejecting unsupported language: {}", tag);
                                    let _ = event_tx.send(SessionEvent::Error(format!("Unsupported language: {}", tag)));
                                }
                            }

                            Ok(SessionCommand::RefreshModels) => {
                                if let Err(e) = backend_command_tx.send(BackendCommand::FetchModels) {
                                    error!("Failed to request model catalog: {}", e);
                                }
                            }

                            Ok(SessionCommand::FetchSystemPrompt) => {
                                if let Err(e) = backend_command_tx.send(BackendCommand::FetchPrompt) {
                                    error!("Failed to request system prompt: {}", e);
                                }
                            }

                            Ok(SessionCommand::SaveSystemPrompt(prompt)) => {
                                if let Err(e) = backend_command_tx.send(BackendCommand::StorePrompt(prompt)) {
                                    error!("Failed to send system prompt: {}", e);
                                }
                            }

                            Ok(SessionCommand::ExportHistory) => {
                                if history.is_empty() {
                                    // the export endpoint is never asked for an empty document
                                    warn!("Export requested with empty history");
                                    let _ = event_tx.send(SessionEvent::Error("No chat history to export.".to_string()));
                                } else if let Err(e) = backend_command_tx.send(BackendCommand::Export(history.snapshot())) {
                                    error!("Failed to request export: {}", e);
                                }
                            }

                            Ok(SessionCommand::Shutdown) => {
                                info!("Shutdown requested");

                                if let Some(source) = capture.as_mut() {
                                    let _ = source.request_stop();
                                }
                                if let Some(tx) = &voice_command_tx {
                                    let _ = tx.send(VoiceCommand::Shutdown);
                                }
                                let _ = backend_command_tx.send(BackendCommand::Shutdown);

                                // Wait for shutdown events with timeout
                                let mut voice_shutdown = voice_command_tx.is_none();
                                let mut backend_shutdown = false;

                                let deadline = Instant::now() + shutdown_timeout;

                                while !(voice_shutdown && backend_shutdown) {
                                    if Instant::now() > deadline {
                                        warn!("Shutdown timeout reached, forcing exit");
                                        break;
                                    }

                                    if !voice_shutdown {
                                        if let Ok(event) = voice_event_rx.recv_timeout(Duration::from_millis(10)) {
                                            if matches!(event, VoiceEvent::Shutdown) {
                                                voice_shutdown = true;
                                                debug!("Voice pipeline shutdown confirmed");
                                            }
                                        }
                                    }

                                    if !backend_shutdown {
                                        if let Ok(event) = backend_event_rx.recv_timeout(Duration::from_millis(10)) {
                                            if matches!(event, BackendEvent::Shutdown) {
                                                backend_shutdown = true;
                                                debug!("Backend shutdown confirmed");
                                            }
                                        }
                                    }
                                }

                                let _ = event_tx.send(SessionEvent::Shutdown);
                                info!("Session shutdown complete");
                                return;
                            }

                            Err(_) => {
                                warn!("Command channel disconnected");
                                break;
                            }
                        }
                    }

                    // Handle recognition events
                    recv(capture_rx) -> event => {
                        match event {
                            Ok(RecognitionEvent::Segment(segment)) => {
                                let is_listening = state.read().conversation.is_listening();
                                if is_listening {
                                    let preview = {
                                        let mut s = state.write();
                                        s.transcript.push(segment);
                                        s.transcript.preview()
                                    };
                                    let _ = event_tx.send(SessionEvent::Interim(preview));
                                } else {
                                    debug!("Dropping transcript segment outside listening");
                                }
                            }

                            Ok(RecognitionEvent::Fault(fault)) => {
                                warn!("Recognition fault: {}", fault);
                                let message = fault.status_message().to_string();
                                state.write().set_status(message.clone());
                                let _ = event_tx.send(SessionEvent::Status(message));

                                // Denial is terminal for the turn; drop the
                                // listening intent so the engine's end does
                                // not restart capture
                                if fault == RecognitionFault::PermissionDenied {
                                    if let Some(source) = capture.as_mut() {
                                        let _ = source.request_stop();
                                    }
                                }
                            }

                            Ok(RecognitionEvent::Ended) => {
                                if let Some(source) = capture.as_mut() {
                                    match source.handle_ended() {
                                        RestartOutcome::Restarted => {
                                            debug!("Recognition restarted in place");
                                        }

                                        RestartOutcome::StoppedByRequest => {
                                            // Either the turn was already frozen by
                                            // StopListening, or a fault dropped the
                                            // intent while still listening
                                            let abandoned = state.read().conversation.is_listening();
                                            if abandoned {
                                                state.write().abort_listening();
                                                let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                                debug!("Listening abandoned without a turn");
                                            }
                                        }

                                        RestartOutcome::Failed(message) => {
                                            error!("Recognition restart failed: {}", message);
                                            let status = RecognitionFault::Other(message).status_message().to_string();
                                            let was_listening = state.read().conversation.is_listening();
                                            {
                                                let mut s = state.write();
                                                if was_listening {
                                                    s.abort_listening();
                                                }
                                                s.set_status(status.clone());
                                            }
                                            let _ = event_tx.send(SessionEvent::Status(status));
                                            if was_listening {
                                                let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                            }
                                        }
                                    }
                                }
                            }

                            Err(_) => {
                                warn!("Recognition event channel disconnected");
                            }
                        }
                    }

                    // Handle voice pipeline events
                    recv(voice_event_rx) -> event => {
                        match event {
                            Ok(VoiceEvent::Started { id }) => {
                                debug!("Playback started for utterance {}", id);
                            }

                            Ok(VoiceEvent::Finished { id }) => {
                                if speaking == Some(id) {
                                    speaking = None;
                                    let duration = state.write().finish_speaking();
                                    if !history.complete_pending_reply(duration) {
                                        warn!("Playback finished with no pending tutor entry");
                                    }
                                    let _ = event_tx.send(SessionEvent::ReplyFinished { duration_secs: duration });
                                    let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                    debug!("Reply playback finished after {}s", duration);
                                } else {
                                    debug!("Ignoring stale playback completion for {}", id);
                                }
                            }

                            Ok(VoiceEvent::Error { id, message }) => {
                                error!("Playback failed for utterance {}: {}", id, message);
                                if speaking == Some(id) {
                                    // playback failure still completes the reply
                                    speaking = None;
                                    let duration = state.write().finish_speaking();
                                    if !history.complete_pending_reply(duration) {
                                        warn!("Playback failed with no pending tutor entry");
                                    }
                                    let _ = event_tx.send(SessionEvent::Error(message));
                                    let _ = event_tx.send(SessionEvent::ReplyFinished { duration_secs: duration });
                                    let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                }
                            }

                            Ok(VoiceEvent::Shutdown) => {
                                debug!("Voice pipeline shutdown event received");
                            }

                            Err(_) => {
                                warn!("Voice event channel disconnected");
                            }
                        }
                    }

                    // Handle backend events
                    recv(backend_event_rx) -> event => {
                        match event {
                            Ok(BackendEvent::Reply { turn, text }) => {
                                let current = active_turn == Some(turn)
                                    && state.read().conversation.is_thinking();
                                if !current {
                                    debug!("Dropping stale reply for turn {}", turn);
                                } else {
                                    active_turn = None;
                                    debug!("Reply for turn {} ({} chars)", turn, text.len());

                                    let entry = ChatEntry::tutor(&text);
                                    history.append(entry.clone());
                                    let _ = event_tx.send(SessionEvent::ReplyRecorded(entry));

                                    match &voice_command_tx {
                                        Some(tx) => {
                                            state.write().begin_speaking();
                                            let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Speaking));

                                            let utterance_id = Uuid::new_v4();
                                            speaking = Some(utterance_id);
                                            if let Err(e) = tx.send(VoiceCommand::Speak { id: utterance_id, text }) {
                                                error!("Failed to send utterance to voice pipeline: {}", e);
                                                speaking = None;
                                                let duration = state.write().finish_speaking();
                                                let _ = history.complete_pending_reply(duration);
                                                let _ = event_tx.send(SessionEvent::ReplyFinished { duration_secs: duration });
                                                let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                            }
                                        }
                                        None => {
                                            // no synthesizer installed; the reply
                                            // completes on the spot
                                            let duration = {
                                                let mut s = state.write();
                                                s.begin_speaking();
                                                s.finish_speaking()
                                            };
                                            if !history.complete_pending_reply(duration) {
                                                warn!("Reply completed with no pending tutor entry");
                                            }
                                            let _ = event_tx.send(SessionEvent::ReplyFinished { duration_secs: duration });
                                            let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                        }
                                    }
                                }
                            }

                            Ok(BackendEvent::Models(models)) => {
                                info!("Model catalog loaded: {} entries", models.len());
                                catalog = models.clone();

                                // Keep the current selection when the new catalog
                                // still has it, otherwise take the flagged default
                                // or the first entry
                                let keep = state
                                    .read()
                                    .selections
                                    .model_id
                                    .as_ref()
                                    .map(|id| catalog.iter().any(|m| &m.id == id))
                                    .unwrap_or(false);
                                if !keep {
                                    let chosen = catalog
                                        .iter()
                                        .find(|m| m.is_default)
                                        .or_else(|| catalog.first())
                                        .map(|m| m.id.clone());
                                    if let Some(id) = &chosen {
                                        debug!("Default model selected: {}", id);
                                    }
                                    state.write().selections.model_id = chosen;
                                }

                                let _ = event_tx.send(SessionEvent::Models(models));
                            }

                            Ok(BackendEvent::Prompt(prompt)) => {
                                let _ = event_tx.send(SessionEvent::SystemPrompt(prompt));
                            }

                            Ok(BackendEvent::PromptStored) => {
                                info!("System prompt saved");
                                let _ = event_tx.send(SessionEvent::SystemPromptSaved);
                            }

                            Ok(BackendEvent::Exported(bytes)) => {
                                info!("History export ready ({} bytes)", bytes.len());
                                let _ = event_tx.send(SessionEvent::HistoryExported(bytes));
                            }

                            Ok(BackendEvent::Failed { op, turn, message }) => {
                                error!("Backend {} failed: {}", op, message);
                                if op == BackendOp::Chat {
                                    let current = turn.is_some()
                                        && turn == active_turn
                                        && state.read().conversation.is_thinking();
                                    if current {
                                        // no tutor entry for a failed turn
                                        active_turn = None;
                                        {
                                            let mut s = state.write();
                                            s.abort_thinking();
                                            s.set_status(message.clone());
                                        }
                                        let _ = event_tx.send(SessionEvent::Error(message));
                                        let _ = event_tx.send(SessionEvent::StateChanged(ConversationState::Idle));
                                    } else {
                                        debug!("Dropping stale chat failure");
                                    }
                                } else {
                                    let _ = event_tx.send(SessionEvent::Error(message));
                                }
                            }

                            Ok(BackendEvent::Shutdown) => {
                                debug!("Backend shutdown event received");
                            }

                            Err(_) => {
                                warn!("Backend event channel disconnected");
                            }
                        }
                    }

                    // Default timeout to prevent busy-waiting
                    default(Duration::from_millis(10)) => {
                        // No events, continue loop
                    }
                }
            }

            info!("Session main loop exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.backend_url, "http://localhost:5000");
        assert_eq!(config.language, "en-US");
        assert_eq!(config.channel_buffer_size, 100);
        assert_eq!(config.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new()
            .with_backend_url("http://127.0.0.1:8080")
            .with_language("zh-CN")
            .with_request_timeout_secs(5)
            .with_channel_buffer_size(200)
            .with_shutdown_timeout_ms(10000);

        assert_eq!(config.backend_url, "http://127.0.0.1:8080");
        assert_eq!(config.language, "zh-CN");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.channel_buffer_size, 200);
        assert_eq!(config.shutdown_timeout_ms, 10000);
    }

    #[test]
    fn test_unsupported_language_is_rejected() {
        let result = Session::new(SessionConfig::new().with_language("fr-FR"));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_backend_url_is_rejected() {
        let result = Session::new(SessionConfig::new().with_backend_url("not a url"));
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_state_is_accessible() {
        // This test verifies the design - state can be shared
        let state = SharedSession::new();

        // Simulate orchestrator writing
        {
            state.write().begin_listening();
        }

        // Simulate front-end/test reading
        assert!(state.is_listening());

        // Simulate orchestrator resolving the turn
        {
            state.write().finish_listening();
            state.write().begin_speaking();
            state.write().finish_speaking();
        }

        assert!(state.is_idle());
    }
}
