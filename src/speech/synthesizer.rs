//! Speech output pipeline over a host synthesizer seam.
//!
//! The pipeline worker owns the host synthesizer and serializes utterances:
//! it picks a voice per utterance, starts playback, and funnels both natural
//! completion and manual stop into a single terminal event per utterance id.
//! The orchestrator never talks to the synthesizer directly.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::speech::voices::{detect_language, pick_voice, VoiceInfo};

/// One utterance handed to the host synthesizer
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    /// BCP-47 tag chosen by language detection
    pub language: String,
    /// Explicit voice, or None for the host default
    pub voice: Option<VoiceInfo>,
}

/// Host speech-synthesis seam.
///
/// `begin` starts playback and returns immediately; the engine sends one
/// unit on `done` when playback finishes naturally. After `cancel` the
/// engine may or may not still signal `done`; the pipeline ignores late
/// signals either way.
pub trait SpeechSynthesizer: Send {
    /// Voices currently available from the host engine
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Begin speaking the utterance
    fn begin(&mut self, utterance: &Utterance, done: Sender<()>) -> Result<()>;

    /// Cancel the active utterance, if any
    fn cancel(&mut self);
}

/// Commands accepted by the voice pipeline
#[derive(Debug)]
pub enum VoiceCommand {
    /// Speak the text, reporting terminal events under `id`
    Speak { id: Uuid, text: String },

    /// Cancel the active utterance
    Stop,

    /// Shutdown the pipeline
    Shutdown,
}

/// Events emitted by the voice pipeline.
///
/// Every utterance id resolves with exactly one terminal event: `Finished`
/// (natural end or stop) or `Error`.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// Playback started for the utterance
    Started { id: Uuid },

    /// Playback is over, whether it ran to completion or was stopped
    Finished { id: Uuid },

    /// The synthesizer refused or failed the utterance
    Error { id: Uuid, message: String },

    /// Worker has shut down
    Shutdown,
}

/// Channel-based speech output pipeline
pub struct VoicePipeline {
    command_tx: Sender<VoiceCommand>,
    command_rx: Receiver<VoiceCommand>,
    event_tx: Sender<VoiceEvent>,
    event_rx: Receiver<VoiceEvent>,
}

impl VoicePipeline {
    pub fn new(buffer_size: usize) -> Self {
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Get a sender for commands
    pub fn command_sender(&self) -> Sender<VoiceCommand> {
        self.command_tx.clone()
    }

    /// Get a receiver for events
    pub fn event_receiver(&self) -> Receiver<VoiceEvent> {
        self.event_rx.clone()
    }

    /// Start the pipeline worker thread with the given host synthesizer
    pub fn start_worker(self, synthesizer: Box<dyn SpeechSynthesizer>) -> Result<JoinHandle<()>> {
        let command_rx = self.command_rx.clone();
        let event_tx = self.event_tx.clone();

        let handle = thread::spawn(move || {
            info!("voice pipeline worker starting");
            run_worker(synthesizer, command_rx, event_tx);
            info!("voice pipeline worker stopped");
        });

        Ok(handle)
    }
}

/// Active playback bookkeeping inside the worker
struct ActiveUtterance {
    id: Uuid,
    done_rx: Receiver<()>,
}

fn run_worker(
    mut synthesizer: Box<dyn SpeechSynthesizer>,
    command_rx: Receiver<VoiceCommand>,
    event_tx: Sender<VoiceEvent>,
) {
    let mut active: Option<ActiveUtterance> = None;

    loop {
        // While something is playing, watch for its completion alongside
        // commands; otherwise just block on commands.
        let waiting = active.as_ref().map(|a| (a.id, a.done_rx.clone()));
        let command = if let Some((id, done_rx)) = waiting {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        error!("command channel error: {}", e);
                        break;
                    }
                },
                recv(done_rx) -> _ => {
                    active = None;
                    debug!("utterance {} finished naturally", id);
                    let _ = event_tx.send(VoiceEvent::Finished { id });
                    continue;
                }
            }
        } else {
            match command_rx.recv() {
                Ok(cmd) => cmd,
                Err(e) => {
                    error!("command channel error: {}", e);
                    break;
                }
            }
        };

        match command {
            VoiceCommand::Speak { id, text } => {
                // A new utterance displaces whatever is still playing;
                // the displaced one resolves as stopped.
                if let Some(playing) = active.take() {
                    warn!("utterance {} displaced by new speak request", playing.id);
                    synthesizer.cancel();
                    let _ = event_tx.send(VoiceEvent::Finished { id: playing.id });
                }

                if text.trim().is_empty() {
                    debug!("empty utterance {}, completing immediately", id);
                    let _ = event_tx.send(VoiceEvent::Started { id });
                    let _ = event_tx.send(VoiceEvent::Finished { id });
                    continue;
                }

                let language = detect_language(&text);
                let inventory = synthesizer.voices();
                let voice = pick_voice(&inventory, language).cloned();
                match &voice {
                    Some(v) => debug!("utterance {} voice: {} ({})", id, v.name, v.language),
                    None => debug!("utterance {} using host default voice", id),
                }

                let utterance = Utterance {
                    text,
                    language: language.tag().to_string(),
                    voice,
                };

                // Fresh channel per utterance; a stale engine signal for a
                // displaced utterance lands in a dropped channel.
                let (done_tx, done_rx) = bounded(1);
                match synthesizer.begin(&utterance, done_tx) {
                    Ok(()) => {
                        active = Some(ActiveUtterance { id, done_rx });
                        let _ = event_tx.send(VoiceEvent::Started { id });
                    }
                    Err(e) => {
                        warn!("synthesis failed for utterance {}: {}", id, e);
                        let _ = event_tx.send(VoiceEvent::Error {
                            id,
                            message: e.to_string(),
                        });
                    }
                }
            }

            VoiceCommand::Stop => match active.take() {
                Some(playing) => {
                    synthesizer.cancel();
                    debug!("utterance {} stopped by request", playing.id);
                    let _ = event_tx.send(VoiceEvent::Finished { id: playing.id });
                }
                None => debug!("stop requested with nothing playing"),
            },

            VoiceCommand::Shutdown => {
                if let Some(playing) = active.take() {
                    synthesizer.cancel();
                    let _ = event_tx.send(VoiceEvent::Finished { id: playing.id });
                }
                info!("voice pipeline worker shutting down");
                let _ = event_tx.send(VoiceEvent::Shutdown);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct SynthState {
        spoken: Vec<Utterance>,
        cancels: usize,
        pending_done: Option<Sender<()>>,
    }

    #[derive(Clone, Default)]
    struct SynthProbe(Arc<Mutex<SynthState>>);

    /// Synthesizer that either completes immediately or parks the done
    /// sender for the test to trigger
    struct ScriptedSynthesizer {
        probe: SynthProbe,
        inventory: Vec<VoiceInfo>,
        auto_complete: bool,
        fail: bool,
    }

    impl SpeechSynthesizer for ScriptedSynthesizer {
        fn voices(&self) -> Vec<VoiceInfo> {
            self.inventory.clone()
        }

        fn begin(&mut self, utterance: &Utterance, done: Sender<()>) -> Result<()> {
            if self.fail {
                return Err(ParleyError::Channel("engine unavailable".to_string()));
            }
            let mut state = self.probe.0.lock();
            state.spoken.push(utterance.clone());
            if self.auto_complete {
                let _ = done.send(());
            } else {
                state.pending_done = Some(done);
            }
            Ok(())
        }

        fn cancel(&mut self) {
            self.probe.0.lock().cancels += 1;
        }
    }

    fn start_pipeline(
        auto_complete: bool,
        fail: bool,
        inventory: Vec<VoiceInfo>,
    ) -> (Sender<VoiceCommand>, Receiver<VoiceEvent>, SynthProbe) {
        let probe = SynthProbe::default();
        let synth = ScriptedSynthesizer {
            probe: probe.clone(),
            inventory,
            auto_complete,
            fail,
        };
        let pipeline = VoicePipeline::new(16);
        let command_tx = pipeline.command_sender();
        let event_rx = pipeline.event_receiver();
        pipeline.start_worker(Box::new(synth)).unwrap();
        (command_tx, event_rx, probe)
    }

    fn recv(event_rx: &Receiver<VoiceEvent>) -> VoiceEvent {
        event_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("timed out waiting for voice event")
    }

    #[test]
    fn natural_end_emits_started_then_finished() {
        let (command_tx, event_rx, _) = start_pipeline(true, false, Vec::new());
        let id = Uuid::new_v4();
        command_tx
            .send(VoiceCommand::Speak {
                id,
                text: "hello there".to_string(),
            })
            .unwrap();

        match recv(&event_rx) {
            VoiceEvent::Started { id: started } => assert_eq!(started, id),
            other => panic!("expected Started, got {:?}", other),
        }
        match recv(&event_rx) {
            VoiceEvent::Finished { id: finished } => assert_eq!(finished, id),
            other => panic!("expected Finished, got {:?}", other),
        }

        command_tx.send(VoiceCommand::Shutdown).unwrap();
    }

    #[test]
    fn utterance_carries_detected_language_and_picked_voice() {
        let inventory = vec![
            VoiceInfo::new("Google US English Female", "en-US"),
            VoiceInfo::new("Google 普通话（中国大陆）", "zh-CN"),
        ];
        let (command_tx, event_rx, probe) = start_pipeline(true, false, inventory);

        command_tx
            .send(VoiceCommand::Speak {
                id: Uuid::new_v4(),
                text: "你好，今天怎么样？".to_string(),
            })
            .unwrap();
        let _ = recv(&event_rx); // Started
        let _ = recv(&event_rx); // Finished

        let state = probe.0.lock();
        let utterance = &state.spoken[0];
        assert_eq!(utterance.language, "zh-CN");
        assert_eq!(
            utterance.voice.as_ref().unwrap().name,
            "Google 普通话（中国大陆）"
        );

        command_tx.send(VoiceCommand::Shutdown).unwrap();
    }

    #[test]
    fn stop_cancels_and_emits_exactly_one_finished() {
        let (command_tx, event_rx, probe) = start_pipeline(false, false, Vec::new());
        let id = Uuid::new_v4();
        command_tx
            .send(VoiceCommand::Speak {
                id,
                text: "a long reply".to_string(),
            })
            .unwrap();
        match recv(&event_rx) {
            VoiceEvent::Started { .. } => {}
            other => panic!("expected Started, got {:?}", other),
        }

        command_tx.send(VoiceCommand::Stop).unwrap();
        match recv(&event_rx) {
            VoiceEvent::Finished { id: finished } => assert_eq!(finished, id),
            other => panic!("expected Finished, got {:?}", other),
        }
        assert_eq!(probe.0.lock().cancels, 1);

        // a late natural-end signal from the engine must not produce a
        // second Finished
        let late = probe.0.lock().pending_done.take();
        if let Some(done) = late {
            let _ = done.send(());
        }
        assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());

        command_tx.send(VoiceCommand::Shutdown).unwrap();
    }

    #[test]
    fn begin_failure_surfaces_error_event() {
        let (command_tx, event_rx, _) = start_pipeline(false, true, Vec::new());
        let id = Uuid::new_v4();
        command_tx
            .send(VoiceCommand::Speak {
                id,
                text: "anything".to_string(),
            })
            .unwrap();

        match recv(&event_rx) {
            VoiceEvent::Error { id: failed, .. } => assert_eq!(failed, id),
            other => panic!("expected Error, got {:?}", other),
        }

        command_tx.send(VoiceCommand::Shutdown).unwrap();
    }

    #[test]
    fn empty_text_completes_without_touching_the_engine() {
        let (command_tx, event_rx, probe) = start_pipeline(false, false, Vec::new());
        let id = Uuid::new_v4();
        command_tx
            .send(VoiceCommand::Speak {
                id,
                text: "   ".to_string(),
            })
            .unwrap();

        match recv(&event_rx) {
            VoiceEvent::Started { .. } => {}
            other => panic!("expected Started, got {:?}", other),
        }
        match recv(&event_rx) {
            VoiceEvent::Finished { .. } => {}
            other => panic!("expected Finished, got {:?}", other),
        }
        assert!(probe.0.lock().spoken.is_empty());

        command_tx.send(VoiceCommand::Shutdown).unwrap();
    }

    #[test]
    fn shutdown_resolves_active_utterance_first() {
        let (command_tx, event_rx, _) = start_pipeline(false, false, Vec::new());
        command_tx
            .send(VoiceCommand::Speak {
                id: Uuid::new_v4(),
                text: "still playing".to_string(),
            })
            .unwrap();
        let _ = recv(&event_rx); // Started

        command_tx.send(VoiceCommand::Shutdown).unwrap();
        match recv(&event_rx) {
            VoiceEvent::Finished { .. } => {}
            other => panic!("expected Finished, got {:?}", other),
        }
        match recv(&event_rx) {
            VoiceEvent::Shutdown => {}
            other => panic!("expected Shutdown, got {:?}", other),
        }
    }
}
