//! Playback controller: one utterance at a time, play/pause toggle, resume
//! cursor, voice switching on error.
//!
//! State machine:
//!
//! ```text
//!   Idle ──play(text)──▶ (host start event) ──▶ Speaking
//!   Speaking ──play──▶ Paused ──play──▶ Speaking
//!   any ──stop──▶ Idle            Speaking ──end/error──▶ Idle
//! ```
//!
//! Every utterance gets a fresh generation id. Host events tagged with an
//! older id are stale (the utterance was cancelled) and are dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::catalog::VoiceCatalog;
use super::host::{BoundaryKind, HostEvent, HostEventKind, SpeechHost, Utterance, UtteranceId};
use super::selector::VoiceSelector;
use super::voice::Voice;
use crate::config::SpeechConfig;
use crate::error::{ReadEasyError, Result};

pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Speaking,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Speaking => write!(f, "SPEAKING"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

/// The text being read and the parameters it is read with.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub text: String,
    /// Chars of `text` already spoken, at word granularity
    pub cursor: usize,
    pub rate: f32,
    pub volume: f32,
    pub voice: Option<Voice>,
    pub state: PlaybackState,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            rate: 1.0,
            volume: 0.8,
            voice: None,
            state: PlaybackState::Idle,
        }
    }
}

/// Immediate result of the play/pause control.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// An utterance was handed to the host; `Speaking` follows its start event
    Starting {
        voice: Option<Voice>,
        substituted: bool,
    },
    Paused,
    /// Playback continues; `substituted` is set when resuming re-selected the voice
    Resumed { substituted: Option<Voice> },
}

/// Something the caller should surface, produced by host events.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    Started,
    Finished,
    /// The voice failed and a reliable one was bound instead; press play to retry
    VoiceSwitched { from: Voice, to: Voice },
    Failed(ReadEasyError),
}

pub struct PlaybackController {
    host: Arc<dyn SpeechHost>,
    catalog: VoiceCatalog,
    selector: VoiceSelector,
    session: PlaybackSession,
    language: String,
    /// Voice chosen explicitly by the user
    pinned_voice: Option<String>,
    generation: UtteranceId,
    /// Char offset in `session.text` where the current utterance begins
    utterance_offset: usize,
    awaiting_start: bool,
    /// Parameters changed while paused; resume must re-speak
    restart_on_resume: bool,
    /// One voice substitution per text after a playback error
    switched_after_error: bool,
}

impl PlaybackController {
    pub fn new(host: Arc<dyn SpeechHost>, catalog: VoiceCatalog, language: impl Into<String>) -> Self {
        let selector = VoiceSelector::new(catalog.policy().clone());
        Self {
            host,
            catalog,
            selector,
            session: PlaybackSession::default(),
            language: language.into(),
            pinned_voice: None,
            generation: 0,
            utterance_offset: 0,
            awaiting_start: false,
            restart_on_resume: false,
            switched_after_error: false,
        }
    }

    pub fn from_config(host: Arc<dyn SpeechHost>, catalog: VoiceCatalog, config: &SpeechConfig) -> Self {
        let mut controller = Self::new(host, catalog, config.language.clone());
        controller.session.rate = config.rate.clamp(MIN_RATE, MAX_RATE);
        controller.session.volume = config.volume.clamp(MIN_VOLUME, MAX_VOLUME);
        if let Some(voice) = &config.voice {
            controller.pinned_voice = Some(voice.clone());
            controller.selector.remember(voice.clone());
        }
        controller
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn cursor(&self) -> usize {
        self.session.cursor
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn generation(&self) -> UtteranceId {
        self.generation
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Whether the play control should be enabled at all.
    pub fn is_available(&self) -> bool {
        self.host.is_supported() && !self.catalog.is_empty()
    }

    /// The single play/pause control.
    ///
    /// Idle (or new text): start reading from the cursor. Speaking: pause.
    /// Paused: resume.
    pub fn play(&mut self, text: &str) -> Result<PlayOutcome> {
        if text.trim().is_empty() {
            warn!("Play requested with no text");
            return Err(ReadEasyError::InputInvalid("no text to read".into()));
        }
        if !self.host.is_supported() {
            return Err(ReadEasyError::Unsupported(
                "no speech synthesis engine available".into(),
            ));
        }

        let same_text = self.session.text == text;
        match self.session.state {
            PlaybackState::Speaking if same_text => {
                self.host.pause();
                self.session.state = PlaybackState::Paused;
                info!("State: SPEAKING → PAUSED (cursor {})", self.session.cursor);
                Ok(PlayOutcome::Paused)
            }
            PlaybackState::Paused if same_text => {
                self.session.state = PlaybackState::Speaking;
                let substituted = if self.restart_on_resume {
                    self.restart_on_resume = false;
                    substitution(self.restart()?)
                } else {
                    self.host.resume();
                    None
                };
                info!("State: PAUSED → SPEAKING");
                Ok(PlayOutcome::Resumed { substituted })
            }
            _ => {
                if !same_text {
                    self.session.text = text.to_string();
                    self.session.cursor = 0;
                    self.switched_after_error = false;
                }
                // A new session always begins from Idle, whatever was playing
                self.session.state = PlaybackState::Idle;
                self.restart_on_resume = false;
                self.restart()
            }
        }
    }

    /// Cancel playback unconditionally and rewind.
    pub fn stop(&mut self) {
        self.host.cancel();
        self.generation += 1;
        self.awaiting_start = false;
        self.restart_on_resume = false;
        self.session.cursor = 0;
        if self.session.state != PlaybackState::Idle {
            info!("State: {} → IDLE (stopped)", self.session.state);
        }
        self.session.state = PlaybackState::Idle;
    }

    /// Parameter setters return the voice the selector fell back to when the
    /// change restarted speech with a substitute.
    pub fn set_rate(&mut self, rate: f32) -> Result<Option<Voice>> {
        if !rate.is_finite() {
            return Err(ReadEasyError::InputInvalid(format!("invalid rate {rate}")));
        }
        let rate = rate.clamp(MIN_RATE, MAX_RATE);
        if (rate - self.session.rate).abs() < f32::EPSILON {
            return Ok(None);
        }
        debug!("Rate {} → {rate}", self.session.rate);
        self.session.rate = rate;
        self.apply_change()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<Option<Voice>> {
        if !volume.is_finite() {
            return Err(ReadEasyError::InputInvalid(format!("invalid volume {volume}")));
        }
        let volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        if (volume - self.session.volume).abs() < f32::EPSILON {
            return Ok(None);
        }
        debug!("Volume {} → {volume}", self.session.volume);
        self.session.volume = volume;
        self.apply_change()
    }

    /// Pin a voice by name, or `None` to let the selector choose again.
    pub fn set_voice(&mut self, name: Option<&str>) -> Result<Option<Voice>> {
        match name {
            Some(name) => {
                let known = self.catalog.find(name).is_some()
                    || self.catalog.refresh().iter().any(|v| v.name == name);
                if !known {
                    return Err(ReadEasyError::InputInvalid(format!("unknown voice '{name}'")));
                }
                info!("Voice pinned: {name}");
                self.pinned_voice = Some(name.to_string());
                self.selector.remember(name);
            }
            None => {
                self.pinned_voice = None;
                self.selector.forget();
            }
        }
        self.switched_after_error = false;
        self.apply_change()
    }

    pub fn set_language(&mut self, language: impl Into<String>) -> Result<Option<Voice>> {
        let language = language.into();
        if language == self.language {
            return Ok(None);
        }
        info!("Target language: {} → {language}", self.language);
        self.language = language;
        if self.pinned_voice.is_some() {
            return Ok(None);
        }
        self.apply_change()
    }

    /// Feed one host event. Returns a notice when the caller should react.
    pub fn handle_event(&mut self, event: HostEvent) -> Option<PlaybackNotice> {
        if event.utterance != self.generation {
            debug!(
                "Ignoring stale {:?} from utterance {} (current {})",
                event.kind, event.utterance, self.generation
            );
            return None;
        }

        match event.kind {
            HostEventKind::Start => {
                if !self.awaiting_start {
                    return None;
                }
                self.awaiting_start = false;
                if self.session.state == PlaybackState::Idle {
                    self.session.state = PlaybackState::Speaking;
                    info!("State: IDLE → SPEAKING (utterance {})", self.generation);
                    return Some(PlaybackNotice::Started);
                }
                None
            }
            HostEventKind::Boundary {
                kind: BoundaryKind::Word,
                char_index,
            } => {
                let total = self.session.text.chars().count();
                let absolute = (self.utterance_offset + char_index).min(total);
                if absolute > self.session.cursor {
                    self.session.cursor = absolute;
                }
                None
            }
            HostEventKind::Boundary { .. } => None,
            HostEventKind::End => {
                info!("State: {} → IDLE (finished)", self.session.state);
                self.detach();
                self.session.cursor = 0;
                Some(PlaybackNotice::Finished)
            }
            HostEventKind::Error { message } => Some(self.on_error(message)),
        }
    }

    fn on_error(&mut self, message: String) -> PlaybackNotice {
        let failing = self.session.voice.clone();
        warn!(
            "Playback error on voice {:?}: {message}",
            failing.as_ref().map(|v| v.name.as_str())
        );
        self.detach();

        if let Some(failing) = failing {
            if !self.switched_after_error && !self.catalog.policy().is_reliable(&failing) {
                let voices = self.catalog.voices();
                if let Some(alternative) = self.selector.reliable_alternative(&voices, &failing) {
                    info!("Switching voice after error: {failing} → {alternative}");
                    self.switched_after_error = true;
                    self.pinned_voice = None;
                    self.selector.remember(alternative.name.clone());
                    self.session.voice = Some(alternative.clone());
                    return PlaybackNotice::VoiceSwitched {
                        from: failing,
                        to: alternative,
                    };
                }
            }
            return PlaybackNotice::Failed(ReadEasyError::Playback {
                voice: Some(failing.name),
                message,
            });
        }

        PlaybackNotice::Failed(ReadEasyError::Playback {
            voice: None,
            message,
        })
    }

    /// Back to Idle and stop listening to the current utterance. The cursor is
    /// kept so a retry continues where reading stopped.
    fn detach(&mut self) {
        self.generation += 1;
        self.awaiting_start = false;
        self.restart_on_resume = false;
        self.session.state = PlaybackState::Idle;
    }

    fn apply_change(&mut self) -> Result<Option<Voice>> {
        match self.session.state {
            PlaybackState::Speaking => self.restart().map(substitution),
            PlaybackState::Paused => {
                self.restart_on_resume = true;
                Ok(None)
            }
            PlaybackState::Idle if self.awaiting_start => self.restart().map(substitution),
            PlaybackState::Idle => Ok(None),
        }
    }

    /// Cancel whatever the host is doing and speak `text[cursor..]` with the
    /// current parameters. Every start and parameter change goes through here.
    fn restart(&mut self) -> Result<PlayOutcome> {
        self.host.cancel();
        self.generation += 1;

        let (voice, substituted) = match self.resolve_voice() {
            Ok(resolved) => resolved,
            Err(e) => {
                self.awaiting_start = false;
                self.session.state = PlaybackState::Idle;
                return Err(e);
            }
        };

        let text = tail(&self.session.text, self.session.cursor).to_string();
        self.utterance_offset = self.session.cursor;
        self.session.voice = voice.clone();
        self.awaiting_start = true;

        debug!(
            "Speaking utterance {} from char {} ({} chars, rate {}, volume {})",
            self.generation,
            self.utterance_offset,
            text.chars().count(),
            self.session.rate,
            self.session.volume
        );

        self.host.speak(Utterance {
            id: self.generation,
            text,
            rate: self.session.rate,
            volume: self.session.volume,
            voice: voice.clone(),
        });

        Ok(PlayOutcome::Starting { voice, substituted })
    }

    fn resolve_voice(&mut self) -> Result<(Option<Voice>, bool)> {
        if self.catalog.is_empty() {
            self.catalog.refresh();
        }
        let voices = self.catalog.voices();

        if let Some(name) = &self.pinned_voice {
            if let Some(voice) = voices.iter().find(|v| &v.name == name) {
                return Ok((Some(voice.clone()), false));
            }
            warn!("Pinned voice '{name}' no longer available, selecting another");
        }

        match self.selector.select(&voices, &self.language) {
            Some(selection) => Ok((Some(selection.voice), selection.substituted)),
            None => Err(ReadEasyError::Unsupported("no voices available".into())),
        }
    }
}

fn substitution(outcome: PlayOutcome) -> Option<Voice> {
    match outcome {
        PlayOutcome::Starting {
            voice: Some(voice),
            substituted: true,
        } => Some(voice),
        _ => None,
    }
}

/// `text` from char offset `cursor` on.
fn tail(text: &str, cursor: usize) -> &str {
    match text.char_indices().nth(cursor) {
        Some((byte, _)) => &text[byte..],
        None => "",
    }
}
