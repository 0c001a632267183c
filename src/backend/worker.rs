//! Backend request worker.
//!
//! Runs backend operations on a dedicated thread with its own tokio runtime,
//! keeping the orchestrator loop synchronous. Commands are processed
//! strictly one at a time, so no backend request ever overlaps another.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::types::ModelEntry;
use crate::backend::Backend;
use crate::error::{ParleyError, Result};
use crate::session::history::ChatEntry;

/// Commands sent to the backend worker
#[derive(Clone, Debug)]
pub enum BackendCommand {
    /// Submit a chat turn; the reply is tagged with `turn`
    Chat {
        turn: Uuid,
        user_input: String,
        model: String,
        language: String,
    },
    /// Fetch the model catalog
    FetchModels,
    /// Fetch the current system prompt
    FetchPrompt,
    /// Replace the system prompt
    StorePrompt(String),
    /// Export the given history through the backend
    Export(Vec<ChatEntry>),
    /// Shutdown the worker
    Shutdown,
}

/// Which backend operation an event refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendOp {
    Chat,
    FetchModels,
    FetchPrompt,
    StorePrompt,
    Export,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendOp::Chat => write!(f, "chat request"),
            BackendOp::FetchModels => write!(f, "model catalog fetch"),
            BackendOp::FetchPrompt => write!(f, "system prompt fetch"),
            BackendOp::StorePrompt => write!(f, "system prompt save"),
            BackendOp::Export => write!(f, "history export"),
        }
    }
}

/// Events emitted by the backend worker
#[derive(Clone, Debug)]
pub enum BackendEvent {
    /// Chat reply for the tagged turn
    Reply { turn: Uuid, text: String },
    /// Model catalog arrived
    Models(Vec<ModelEntry>),
    /// Current system prompt arrived
    Prompt(String),
    /// System prompt was saved
    PromptStored,
    /// Exported document bytes
    Exported(Vec<u8>),
    /// An operation failed; `turn` is set for chat failures
    Failed {
        op: BackendOp,
        turn: Option<Uuid>,
        message: String,
    },
    /// Worker shut down
    Shutdown,
}

/// Handle for interacting with a running backend worker
pub struct BackendHandle {
    /// Send commands to the worker
    pub command_tx: Sender<BackendCommand>,
    /// Receive events from the worker
    pub event_rx: Receiver<BackendEvent>,
    /// Thread handle for the worker
    worker_handle: Option<JoinHandle<()>>,
}

impl BackendHandle {
    /// Submit a chat turn
    pub fn chat(&self, turn: Uuid, user_input: &str, model: &str, language: &str) -> Result<()> {
        self.command_tx
            .send(BackendCommand::Chat {
                turn,
                user_input: user_input.to_string(),
                model: model.to_string(),
                language: language.to_string(),
            })
            .map_err(|e| ParleyError::Channel(format!("Failed to send chat command: {}", e)))
    }

    /// Request the model catalog
    pub fn fetch_models(&self) -> Result<()> {
        self.command_tx
            .send(BackendCommand::FetchModels)
            .map_err(|e| ParleyError::Channel(format!("Failed to send models command: {}", e)))
    }

    /// Request the current system prompt
    pub fn fetch_prompt(&self) -> Result<()> {
        self.command_tx
            .send(BackendCommand::FetchPrompt)
            .map_err(|e| ParleyError::Channel(format!("Failed to send prompt command: {}", e)))
    }

    /// Store a replacement system prompt
    pub fn store_prompt(&self, prompt: &str) -> Result<()> {
        self.command_tx
            .send(BackendCommand::StorePrompt(prompt.to_string()))
            .map_err(|e| ParleyError::Channel(format!("Failed to send prompt: {}", e)))
    }

    /// Export the given history
    pub fn export(&self, history: Vec<ChatEntry>) -> Result<()> {
        self.command_tx
            .send(BackendCommand::Export(history))
            .map_err(|e| ParleyError::Channel(format!("Failed to send export command: {}", e)))
    }

    /// Shutdown the worker and join its thread
    pub fn shutdown(self) -> Result<()> {
        let _ = self.command_tx.send(BackendCommand::Shutdown);
        if let Some(handle) = self.worker_handle {
            handle
                .join()
                .map_err(|_| ParleyError::Channel("Backend worker thread panicked".to_string()))?;
        }
        Ok(())
    }

    /// Try to receive an event without blocking
    pub fn try_recv_event(&self) -> Option<BackendEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event, blocking until available
    pub fn recv_event(&self) -> Result<BackendEvent> {
        self.event_rx
            .recv()
            .map_err(|e| ParleyError::Channel(format!("Failed to receive event: {}", e)))
    }
}

/// Spawns the backend worker thread
pub struct BackendRunner {
    backend: Arc<dyn Backend>,
    buffer_size: usize,
}

impl BackendRunner {
    pub fn new(backend: Arc<dyn Backend>, buffer_size: usize) -> Self {
        Self {
            backend,
            buffer_size,
        }
    }

    /// Start the backend worker thread.
    ///
    /// The worker runs in a separate thread with its own tokio runtime.
    pub fn start_worker(self) -> Result<BackendHandle> {
        let (command_tx, command_rx) = bounded::<BackendCommand>(self.buffer_size);
        let (event_tx, event_rx) = bounded::<BackendEvent>(self.buffer_size);

        let backend = self.backend;
        let worker_handle = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime: {}", e);
                    let _ = event_tx.send(BackendEvent::Failed {
                        op: BackendOp::Chat,
                        turn: None,
                        message: format!("Failed to create runtime: {}", e),
                    });
                    let _ = event_tx.send(BackendEvent::Shutdown);
                    return;
                }
            };

            runtime.block_on(async move {
                worker_loop(backend, command_rx, event_tx).await;
            });
        });

        Ok(BackendHandle {
            command_tx,
            event_rx,
            worker_handle: Some(worker_handle),
        })
    }
}

/// Main worker loop performing backend requests one at a time
async fn worker_loop(
    backend: Arc<dyn Backend>,
    command_rx: Receiver<BackendCommand>,
    event_tx: Sender<BackendEvent>,
) {
    info!("backend worker ready");

    loop {
        let command = match command_rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => {
                info!("Command channel closed, shutting down");
                break;
            }
        };

        let event = match command {
            BackendCommand::Chat {
                turn,
                user_input,
                model,
                language,
            } => {
                debug!("chat turn {} dispatched", turn);
                match backend.chat(&user_input, &model, &language).await {
                    Ok(text) => BackendEvent::Reply { turn, text },
                    Err(e) => {
                        error!("chat request failed: {}", e);
                        BackendEvent::Failed {
                            op: BackendOp::Chat,
                            turn: Some(turn),
                            message: e.user_message(),
                        }
                    }
                }
            }

            BackendCommand::FetchModels => match backend.models().await {
                Ok(models) => BackendEvent::Models(models),
                Err(e) => {
                    error!("model catalog fetch failed: {}", e);
                    BackendEvent::Failed {
                        op: BackendOp::FetchModels,
                        turn: None,
                        message: e.user_message(),
                    }
                }
            },

            BackendCommand::FetchPrompt => match backend.system_prompt().await {
                Ok(prompt) => BackendEvent::Prompt(prompt),
                Err(e) => {
                    error!("system prompt fetch failed: {}", e);
                    BackendEvent::Failed {
                        op: BackendOp::FetchPrompt,
                        turn: None,
                        message: e.user_message(),
                    }
                }
            },

            BackendCommand::StorePrompt(prompt) => {
                match backend.save_system_prompt(&prompt).await {
                    Ok(()) => BackendEvent::PromptStored,
                    Err(e) => {
                        error!("system prompt save failed: {}", e);
                        BackendEvent::Failed {
                            op: BackendOp::StorePrompt,
                            turn: None,
                            message: e.user_message(),
                        }
                    }
                }
            }

            BackendCommand::Export(history) => match backend.export(&history).await {
                Ok(bytes) => BackendEvent::Exported(bytes),
                Err(e) => {
                    error!("history export failed: {}", e);
                    BackendEvent::Failed {
                        op: BackendOp::Export,
                        turn: None,
                        message: e.user_message(),
                    }
                }
            },

            BackendCommand::Shutdown => {
                info!("Received shutdown command");
                break;
            }
        };

        if event_tx.send(event).is_err() {
            error!("Event channel closed");
            break;
        }
    }

    let _ = event_tx.send(BackendEvent::Shutdown);
    info!("backend worker shutdown complete");
}
