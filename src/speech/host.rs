//! Speech host abstraction.
//!
//! A host is the process-wide speech engine: it enumerates voices, speaks one
//! utterance at a time and reports lifecycle events asynchronously through an
//! event channel. Every event carries the id of the utterance it belongs to so
//! the controller can drop callbacks from cancelled utterances.

use tokio::sync::{mpsc, watch};

use super::voice::Voice;

/// Monotonic id assigned by the controller to each utterance it starts.
pub type UtteranceId = u64;

/// One unit of synthesized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub volume: f32,
    /// `None` lets the host use its default voice
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Word,
    Sentence,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEventKind {
    Start,
    /// `char_index` is relative to the utterance text, in chars
    Boundary { kind: BoundaryKind, char_index: usize },
    End,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub utterance: UtteranceId,
    pub kind: HostEventKind,
}

impl HostEvent {
    pub fn start(utterance: UtteranceId) -> Self {
        Self {
            utterance,
            kind: HostEventKind::Start,
        }
    }

    pub fn word(utterance: UtteranceId, char_index: usize) -> Self {
        Self {
            utterance,
            kind: HostEventKind::Boundary {
                kind: BoundaryKind::Word,
                char_index,
            },
        }
    }

    pub fn end(utterance: UtteranceId) -> Self {
        Self {
            utterance,
            kind: HostEventKind::End,
        }
    }

    pub fn error(utterance: UtteranceId, message: impl Into<String>) -> Self {
        Self {
            utterance,
            kind: HostEventKind::Error {
                message: message.into(),
            },
        }
    }
}

pub type HostEventSender = mpsc::UnboundedSender<HostEvent>;
pub type HostEventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// Channel a host uses to deliver lifecycle events to its controller.
pub fn event_channel() -> (HostEventSender, HostEventReceiver) {
    mpsc::unbounded_channel()
}

/// Process-wide speech engine.
///
/// `speak`, `pause`, `resume` and `cancel` return immediately; outcomes arrive
/// later as [`HostEvent`]s.
pub trait SpeechHost: Send + Sync {
    /// Whether a speech engine exists at all.
    fn is_supported(&self) -> bool;

    /// Current voice list. May be empty until the host finishes enumerating.
    fn voices(&self) -> Vec<Voice>;

    /// Change notifications for the voice list, if the host emits them.
    fn voices_changed(&self) -> Option<watch::Receiver<u64>> {
        None
    }

    fn speak(&self, utterance: Utterance);

    fn pause(&self);

    fn resume(&self);

    /// Cancel the current and any queued utterance. Safe to call when idle.
    fn cancel(&self);
}

/// Host for environments without a speech engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl SpeechHost for NullHost {
    fn is_supported(&self) -> bool {
        false
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn speak(&self, utterance: Utterance) {
        tracing::debug!("NullHost ignoring utterance {}", utterance.id);
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn cancel(&self) {}
}
