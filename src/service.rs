//! Reader service: one task driving playback, transforms and the document.
//!
//! Commands, host events, catalog updates and transform results all arrive on
//! channels and are handled in a single `select!` loop, so the playback
//! controller is only ever touched from one place.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{ReadEasyError, Result};
use crate::speech::host::HostEventReceiver;
use crate::speech::{CatalogSubscription, PlayOutcome, PlaybackController, PlaybackNotice, PlaybackState, Voice};
use crate::transform::{lookup_language, TextTransformClient, TransformKind, TransformRequest, TransformResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderCommand {
    /// Play/pause toggle on the document's active text
    Play,
    Stop,
    SetRate(f32),
    SetVolume(f32),
    SetVoice(Option<String>),
    SetLanguage(String),
    Transform {
        kind: TransformKind,
        target_language: Option<String>,
    },
    /// Discard transform output and read the extracted text again
    Revert,
    Export(PathBuf),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderNotice {
    Started,
    Paused,
    Resumed,
    Finished,
    Stopped,
    /// The selector could not honour the previous voice or target language
    VoiceSubstituted(Voice),
    VoiceSwitched { from: Voice, to: Voice },
    VoicesChanged(usize),
    TransformStarted(TransformKind),
    TransformDone { kind: TransformKind, truncated: bool },
    Exported(PathBuf),
    Error(ReadEasyError),
}

type TransformOutcome = (TransformKind, Option<String>, Result<TransformResult>);

pub struct ReaderService {
    controller: PlaybackController,
    transform: Arc<TextTransformClient>,
    document: Document,
    host_events: HostEventReceiver,
    notices: mpsc::UnboundedSender<ReaderNotice>,
    transform_tx: mpsc::UnboundedSender<TransformOutcome>,
    transform_rx: mpsc::UnboundedReceiver<TransformOutcome>,
    transform_in_flight: Option<TransformKind>,
}

impl ReaderService {
    pub fn new(
        controller: PlaybackController,
        transform: TextTransformClient,
        document: Document,
        host_events: HostEventReceiver,
    ) -> (Self, mpsc::UnboundedReceiver<ReaderNotice>) {
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let (transform_tx, transform_rx) = mpsc::unbounded_channel();
        let service = Self {
            controller,
            transform: Arc::new(transform),
            document,
            host_events,
            notices,
            transform_tx,
            transform_rx,
            transform_in_flight: None,
        };
        (service, notices_rx)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    /// Run until `Shutdown` or until every command sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ReaderCommand>) -> Document {
        let (voices_tx, mut voices_rx) = mpsc::unbounded_channel::<usize>();
        let _subscription: CatalogSubscription = self
            .controller
            .catalog()
            .subscribe(move |voices| {
                let _ = voices_tx.send(voices.len());
            });

        info!("Reader ready: {} ({} chars)", self.document.file_name(), self.document.active_text().chars().count());

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(ReaderCommand::Shutdown) | None => break,
                        Some(command) => self.on_command(command),
                    }
                }
                Some(event) = self.host_events.recv() => {
                    if let Some(notice) = self.controller.handle_event(event) {
                        self.on_playback_notice(notice);
                    }
                }
                Some(count) = voices_rx.recv() => {
                    self.notify(ReaderNotice::VoicesChanged(count));
                }
                Some((kind, target, result)) = self.transform_rx.recv() => {
                    self.on_transform_result(kind, target, result);
                }
            }
        }

        self.controller.stop();
        info!("Reader stopped");
        self.document
    }

    fn on_command(&mut self, command: ReaderCommand) {
        debug!("Command: {command:?}");
        let result = match command {
            ReaderCommand::Play => self.play(),
            ReaderCommand::Stop => {
                self.controller.stop();
                self.notify(ReaderNotice::Stopped);
                Ok(())
            }
            ReaderCommand::SetRate(rate) => {
                let change = self.controller.set_rate(rate);
                self.on_parameter_change(change)
            }
            ReaderCommand::SetVolume(volume) => {
                let change = self.controller.set_volume(volume);
                self.on_parameter_change(change)
            }
            ReaderCommand::SetVoice(name) => {
                let change = self.controller.set_voice(name.as_deref());
                self.on_parameter_change(change)
            }
            ReaderCommand::SetLanguage(language) => {
                let change = self.controller.set_language(language);
                self.on_parameter_change(change)
            }
            ReaderCommand::Transform {
                kind,
                target_language,
            } => self.start_transform(kind, target_language),
            ReaderCommand::Revert => {
                self.document.revert();
                self.controller.stop();
                self.notify(ReaderNotice::Stopped);
                Ok(())
            }
            ReaderCommand::Export(dir) => self
                .document
                .export(&dir)
                .map(|path| self.notify(ReaderNotice::Exported(path))),
            ReaderCommand::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            self.notify(ReaderNotice::Error(e));
        }
    }

    fn play(&mut self) -> Result<()> {
        let text = self.document.active_text().to_string();
        match self.controller.play(&text)? {
            PlayOutcome::Starting {
                voice: Some(voice),
                substituted: true,
            } => self.notify(ReaderNotice::VoiceSubstituted(voice)),
            PlayOutcome::Starting { .. } => {}
            PlayOutcome::Paused => self.notify(ReaderNotice::Paused),
            PlayOutcome::Resumed { substituted } => {
                self.notify(ReaderNotice::Resumed);
                if let Some(voice) = substituted {
                    self.notify(ReaderNotice::VoiceSubstituted(voice));
                }
            }
        }
        Ok(())
    }

    fn on_parameter_change(&self, change: Result<Option<Voice>>) -> Result<()> {
        if let Some(voice) = change? {
            self.notify(ReaderNotice::VoiceSubstituted(voice));
        }
        Ok(())
    }

    fn on_playback_notice(&mut self, notice: PlaybackNotice) {
        let notice = match notice {
            PlaybackNotice::Started => ReaderNotice::Started,
            PlaybackNotice::Finished => ReaderNotice::Finished,
            PlaybackNotice::VoiceSwitched { from, to } => ReaderNotice::VoiceSwitched { from, to },
            PlaybackNotice::Failed(e) => ReaderNotice::Error(e),
        };
        self.notify(notice);
    }

    fn start_transform(&mut self, kind: TransformKind, target_language: Option<String>) -> Result<()> {
        if let Some(running) = self.transform_in_flight {
            return Err(ReadEasyError::InputInvalid(format!(
                "{running} is still running"
            )));
        }

        let request = TransformRequest {
            kind,
            text: self.document.active_text().to_string(),
            target_language: target_language.clone(),
        };
        let client = self.transform.clone();
        let tx = self.transform_tx.clone();
        tokio::spawn(async move {
            let result = client.transform(&request).await;
            let _ = tx.send((kind, target_language, result));
        });

        self.transform_in_flight = Some(kind);
        self.notify(ReaderNotice::TransformStarted(kind));
        Ok(())
    }

    fn on_transform_result(
        &mut self,
        kind: TransformKind,
        target_language: Option<String>,
        result: Result<TransformResult>,
    ) {
        self.transform_in_flight = None;
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                self.notify(ReaderNotice::Error(e));
                return;
            }
        };

        let truncated = output.truncated;
        self.document.apply(kind, output);
        info!("Text {} successfully", kind.past_tense());
        self.notify(ReaderNotice::TransformDone { kind, truncated });

        let was_speaking = self.controller.state() == PlaybackState::Speaking;
        self.controller.stop();

        if kind == TransformKind::Translate {
            if let Some(language) = target_language.as_deref().and_then(lookup_language) {
                if let Err(e) = self.controller.set_language(language.code) {
                    warn!("Could not switch speech language to {}: {e}", language.code);
                }
            }
        }

        // Keep reading, now on the new text
        if was_speaking {
            if let Err(e) = self.play() {
                self.notify(ReaderNotice::Error(e));
            }
        }
    }

    fn notify(&self, notice: ReaderNotice) {
        debug!("Notice: {notice:?}");
        let _ = self.notices.send(notice);
    }
}
