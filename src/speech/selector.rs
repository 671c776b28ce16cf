//! Voice selection for a target language.
//!
//! Order of preference:
//! 1. the previously selected voice (session continuity), unless it is
//!    unreliable and a reliable voice exists for the same language
//! 2. exact language-tag match, then primary-subtag match
//! 3. any English voice, then the first voice at all
//!
//! Steps 1 (when switching) and 3 are substitutions and are flagged as such so
//! the caller can tell the user.

use tracing::{debug, info};

use super::catalog::ReliabilityPolicy;
use super::voice::Voice;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub voice: Voice,
    /// The voice differs from what the user asked for or had before
    pub substituted: bool,
}

impl Selection {
    fn kept(voice: &Voice) -> Self {
        Self {
            voice: voice.clone(),
            substituted: false,
        }
    }

    fn substituted(voice: &Voice) -> Self {
        Self {
            voice: voice.clone(),
            substituted: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoiceSelector {
    policy: ReliabilityPolicy,
    previous: Option<String>,
}

impl VoiceSelector {
    pub fn new(policy: ReliabilityPolicy) -> Self {
        Self {
            policy,
            previous: None,
        }
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Record a voice the user picked explicitly.
    pub fn remember(&mut self, name: impl Into<String>) {
        self.previous = Some(name.into());
    }

    pub fn forget(&mut self) {
        self.previous = None;
    }

    /// Pick the best voice for `target_language` and remember it.
    ///
    /// Returns `None` only when `voices` is empty.
    pub fn select(&mut self, voices: &[Voice], target_language: &str) -> Option<Selection> {
        let selection = self.resolve(voices, target_language);

        match &selection {
            Some(s) if s.substituted => {
                info!(
                    "Voice substituted for '{target_language}': {:?} → {}",
                    self.previous, s.voice
                );
            }
            Some(s) => debug!("Voice for '{target_language}': {}", s.voice),
            None => debug!("No voice available for '{target_language}'"),
        }

        if let Some(s) = &selection {
            self.previous = Some(s.voice.name.clone());
        }
        selection
    }

    fn resolve(&self, voices: &[Voice], target_language: &str) -> Option<Selection> {
        let filtered = self.policy.filter(voices);
        if filtered.is_empty() {
            return None;
        }
        let ranked = self.policy.rank(&filtered, target_language);

        let mut previous_dropped = false;
        let previous = self
            .previous
            .as_deref()
            .and_then(|name| voices.iter().find(|v| v.name == name))
            .filter(|v| v.matches_language(target_language));

        if let Some(previous) = previous {
            if !self.policy.is_reliable(previous) {
                if let Some(alternative) = self.reliable_alternative_in(&ranked, previous) {
                    return Some(Selection::substituted(&alternative));
                }
            }
            if filtered.iter().any(|v| v.name == previous.name) {
                return Some(Selection::kept(previous));
            }
            previous_dropped = true;
        }

        let by_language = ranked
            .iter()
            .find(|v| v.matches_tag(target_language))
            .or_else(|| ranked.iter().find(|v| v.matches_language(target_language)));
        if let Some(voice) = by_language {
            return Some(Selection {
                voice: voice.clone(),
                substituted: previous_dropped,
            });
        }

        ranked
            .iter()
            .find(|v| v.is_english())
            .or_else(|| ranked.first())
            .map(Selection::substituted)
    }

    /// A reliable voice for the same language as `failing`, if any.
    pub fn reliable_alternative(&self, voices: &[Voice], failing: &Voice) -> Option<Voice> {
        let ranked = self
            .policy
            .rank(&self.policy.filter(voices), &failing.language_tag);
        self.reliable_alternative_in(&ranked, failing)
    }

    fn reliable_alternative_in(&self, ranked: &[Voice], failing: &Voice) -> Option<Voice> {
        let is_candidate = |v: &&Voice| v.name != failing.name && self.policy.is_reliable(v);
        ranked
            .iter()
            .filter(is_candidate)
            .find(|v| v.matches_tag(&failing.language_tag))
            .or_else(|| {
                ranked
                    .iter()
                    .filter(is_candidate)
                    .find(|v| v.matches_language(&failing.language_tag))
            })
            .cloned()
    }
}
