//! Scriptable speech host for tests and dry runs.
//!
//! Records every call the controller makes and lets the caller change the
//! voice list (with or without a change notification) to mimic hosts that
//! enumerate voices late.

use parking_lot::Mutex;
use tokio::sync::watch;

use super::host::{HostEvent, HostEventSender, SpeechHost, Utterance};
use super::voice::Voice;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
}

pub struct MockHost {
    supported: bool,
    voices: Mutex<Vec<Voice>>,
    calls: Mutex<Vec<HostCall>>,
    changed_tx: watch::Sender<u64>,
    notifies_changes: bool,
    /// When set, `speak` immediately reports a start event
    events: Option<HostEventSender>,
}

impl MockHost {
    pub fn new(voices: Vec<Voice>) -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            supported: true,
            voices: Mutex::new(voices),
            calls: Mutex::new(Vec::new()),
            changed_tx,
            notifies_changes: true,
            events: None,
        }
    }

    /// Host with no speech engine at all.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(Vec::new())
        }
    }

    /// Host that never fires change notifications (polling is the only way to see updates).
    pub fn without_change_events(mut self) -> Self {
        self.notifies_changes = false;
        self
    }

    pub fn with_event_sender(mut self, events: HostEventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the voice list and notify subscribers.
    pub fn set_voices(&self, voices: Vec<Voice>) {
        *self.voices.lock() = voices;
        self.changed_tx.send_modify(|version| *version += 1);
    }

    /// Replace the voice list without a change notification.
    pub fn set_voices_silently(&self, voices: Vec<Voice>) {
        *self.voices.lock() = voices;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Speak(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_utterance(&self) -> Option<Utterance> {
        self.spoken().pop()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, HostCall::Cancel))
            .count()
    }
}

impl SpeechHost for MockHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn voices(&self) -> Vec<Voice> {
        if !self.supported {
            return Vec::new();
        }
        self.voices.lock().clone()
    }

    fn voices_changed(&self) -> Option<watch::Receiver<u64>> {
        if self.notifies_changes {
            Some(self.changed_tx.subscribe())
        } else {
            None
        }
    }

    fn speak(&self, utterance: Utterance) {
        let id = utterance.id;
        self.calls.lock().push(HostCall::Speak(utterance));
        if let Some(events) = &self.events {
            let _ = events.send(HostEvent::start(id));
        }
    }

    fn pause(&self) {
        self.calls.lock().push(HostCall::Pause);
    }

    fn resume(&self) {
        self.calls.lock().push(HostCall::Resume);
    }

    fn cancel(&self) {
        self.calls.lock().push(HostCall::Cancel);
    }
}
