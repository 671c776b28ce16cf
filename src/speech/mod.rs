//! Read-aloud: voice catalog, voice selection and playback control on top of
//! a pluggable speech host.

pub mod catalog;
pub mod diagnostics;
pub mod host;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod mock;
pub mod playback;
pub mod selector;
pub mod voice;

pub use catalog::{CatalogSubscription, ReliabilityPolicy, VoiceCatalog};
pub use diagnostics::SpeechReport;
pub use host::{event_channel, HostEvent, HostEventKind, NullHost, SpeechHost, Utterance, UtteranceId};
pub use playback::{PlayOutcome, PlaybackController, PlaybackNotice, PlaybackState};
pub use selector::{Selection, VoiceSelector};
pub use voice::Voice;
