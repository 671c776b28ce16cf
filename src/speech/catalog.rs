//! Voice catalog: the host's voice list, kept fresh and ranked by reliability.
//!
//! Some hosts populate their voice list late and never fire a change event,
//! so `subscribe` combines host notifications with a short re-poll schedule.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::host::SpeechHost;
use super::voice::Voice;
use crate::config::SpeechConfig;

/// Declared policy for "is this voice likely to fail".
///
/// A voice is reliable when the host reports it as local and its name does
/// not contain any of the configured network-vendor fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityPolicy {
    patterns: Vec<String>,
}

impl ReliabilityPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Name matches a known network-backed naming convention.
    pub fn is_name_flagged(&self, voice: &Voice) -> bool {
        let name = voice.name.to_lowercase();
        self.patterns.iter().any(|p| name.contains(p.as_str()))
    }

    pub fn is_reliable(&self, voice: &Voice) -> bool {
        voice.is_local && !self.is_name_flagged(voice)
    }

    /// Drop name-flagged voices, except where they are the only voices left
    /// for their language.
    pub fn filter(&self, voices: &[Voice]) -> Vec<Voice> {
        voices
            .iter()
            .filter(|voice| {
                if !self.is_name_flagged(voice) {
                    return true;
                }
                let lang = voice.primary_language();
                let has_alternative = voices
                    .iter()
                    .any(|v| !self.is_name_flagged(v) && v.primary_language() == lang);
                !has_alternative
            })
            .cloned()
            .collect()
    }

    /// Stable sort: reliable tier first; inside a tier target language, then
    /// English, then the rest.
    pub fn rank(&self, voices: &[Voice], target_language: &str) -> Vec<Voice> {
        let mut ranked = voices.to_vec();
        ranked.sort_by_key(|voice| {
            let tier = if self.is_reliable(voice) { 0 } else { 1 };
            let language = if voice.matches_language(target_language) {
                0
            } else if voice.is_english() {
                1
            } else {
                2
            };
            (tier, language)
        });
        ranked
    }
}

impl Default for ReliabilityPolicy {
    fn default() -> Self {
        Self::new(SpeechConfig::default().unreliable_patterns)
    }
}

/// Shared view of the host's voices. Clones share the same list.
#[derive(Clone)]
pub struct VoiceCatalog {
    host: Arc<dyn SpeechHost>,
    policy: ReliabilityPolicy,
    voices: Arc<RwLock<Vec<Voice>>>,
    poll_delays: Vec<Duration>,
}

impl VoiceCatalog {
    pub fn new(host: Arc<dyn SpeechHost>, policy: ReliabilityPolicy, poll_delays: Vec<Duration>) -> Self {
        Self {
            host,
            policy,
            voices: Arc::new(RwLock::new(Vec::new())),
            poll_delays,
        }
    }

    pub fn from_config(host: Arc<dyn SpeechHost>, config: &SpeechConfig) -> Self {
        Self::new(
            host,
            ReliabilityPolicy::new(&config.unreliable_patterns),
            config.poll_delays(),
        )
    }

    pub fn policy(&self) -> &ReliabilityPolicy {
        &self.policy
    }

    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    /// Re-query the host and replace the list. Returns the new list, which is
    /// empty (not an error) when the host has nothing yet.
    pub fn refresh(&self) -> Vec<Voice> {
        self.refresh_changed();
        self.voices()
    }

    /// Refresh and report whether the list differs from the previous one.
    fn refresh_changed(&self) -> bool {
        let latest = if self.host.is_supported() {
            self.host.voices()
        } else {
            Vec::new()
        };

        let mut current = self.voices.write();
        if *current == latest {
            return false;
        }
        info!("Voice catalog updated: {} → {} voices", current.len(), latest.len());
        *current = latest;
        true
    }

    /// Raw host list as of the last refresh.
    pub fn voices(&self) -> Vec<Voice> {
        self.voices.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.read().is_empty()
    }

    pub fn find(&self, name: &str) -> Option<Voice> {
        self.voices.read().iter().find(|v| v.name == name).cloned()
    }

    pub fn filtered(&self) -> Vec<Voice> {
        self.policy.filter(&self.voices.read())
    }

    pub fn ranked(&self, target_language: &str) -> Vec<Voice> {
        self.policy.rank(&self.filtered(), target_language)
    }

    /// Watch for voice list changes.
    ///
    /// Refreshes immediately, then on every host change notification and at
    /// each configured poll delay. `callback` runs only when the list changed.
    /// Must be called from within a tokio runtime; dropping the returned
    /// handle stops the watcher.
    pub fn subscribe<F>(&self, callback: F) -> CatalogSubscription
    where
        F: Fn(&[Voice]) + Send + Sync + 'static,
    {
        if self.refresh_changed() {
            callback(&self.voices());
        }

        let catalog = self.clone();
        let mut changes = self.host.voices_changed();
        let delays = self.poll_delays.clone();

        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut schedule = delays.into_iter();
            let mut next_poll = schedule.next().map(|d| start + d);

            loop {
                if next_poll.is_none() && changes.is_none() {
                    debug!("Voice catalog watcher finished");
                    break;
                }

                let wake = {
                    let poll = async {
                        match next_poll {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => std::future::pending::<()>().await,
                        }
                    };
                    let change = async {
                        match changes.as_mut() {
                            Some(rx) => rx.changed().await,
                            None => std::future::pending::<Result<(), watch::error::RecvError>>().await,
                        }
                    };
                    tokio::select! {
                        _ = poll => Wake::Poll,
                        result = change => match result {
                            Ok(()) => Wake::Changed,
                            Err(_) => Wake::Closed,
                        },
                    }
                };

                match wake {
                    Wake::Poll => {
                        next_poll = schedule.next().map(|d| start + d);
                        debug!("Voice catalog poll");
                    }
                    Wake::Changed => debug!("Host reported voice list change"),
                    Wake::Closed => {
                        changes = None;
                        continue;
                    }
                }

                if catalog.refresh_changed() {
                    callback(&catalog.voices());
                }
            }
        });

        CatalogSubscription { handle }
    }
}

enum Wake {
    Poll,
    Changed,
    Closed,
}

/// Handle for a running catalog watcher. Dropping it stops the watcher.
pub struct CatalogSubscription {
    handle: JoinHandle<()>,
}

impl CatalogSubscription {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CatalogSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::mock::MockHost;
    use parking_lot::Mutex;

    fn policy() -> ReliabilityPolicy {
        ReliabilityPolicy::default()
    }

    #[test]
    fn test_reliability() {
        let policy = policy();
        assert!(policy.is_reliable(&Voice::new("Amelie", "fr-FR", true)));
        assert!(!policy.is_reliable(&Voice::new("Google français", "fr-FR", true)));
        assert!(!policy.is_reliable(&Voice::new("Remote-FR", "fr-FR", false)));
        assert!(policy.is_name_flagged(&Voice::new("Microsoft Denise Online (Natural)", "fr-FR", false)));
    }

    #[test]
    fn test_filter_keeps_last_resort() {
        let voices = vec![
            Voice::new("Google US English", "en-US", false),
            Voice::new("Samantha", "en-US", true),
            Voice::new("Google français", "fr-FR", false),
        ];
        let filtered = policy().filter(&voices);
        let names: Vec<&str> = filtered.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Samantha", "Google français"]);
    }

    #[test]
    fn test_rank_tiers() {
        let voices = vec![
            Voice::new("Remote-FR", "fr-FR", false),
            Voice::new("Anna", "de-DE", true),
            Voice::new("Local-EN", "en-US", true),
            Voice::new("Amelie", "fr-CA", true),
        ];
        let ranked = policy().rank(&voices, "fr");
        let names: Vec<&str> = ranked.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Amelie", "Local-EN", "Anna", "Remote-FR"]);
    }

    #[test]
    fn test_rank_is_stable() {
        let voices = vec![
            Voice::new("B", "en-US", true),
            Voice::new("A", "en-GB", true),
        ];
        let ranked = policy().rank(&voices, "en");
        assert_eq!(ranked[0].name, "B");
        assert_eq!(ranked[1].name, "A");
    }

    #[test]
    fn test_refresh_before_population() {
        let host = Arc::new(MockHost::new(Vec::new()));
        let catalog = VoiceCatalog::new(host.clone(), policy(), Vec::new());
        assert!(catalog.refresh().is_empty());
        assert!(catalog.refresh().is_empty());

        host.set_voices_silently(vec![Voice::new("Samantha", "en-US", true)]);
        assert_eq!(catalog.refresh().len(), 1);
        assert_eq!(catalog.refresh().len(), 1);
    }

    #[test]
    fn test_unsupported_host_stays_empty() {
        let host = Arc::new(MockHost::unsupported());
        let catalog = VoiceCatalog::new(host, policy(), Vec::new());
        assert!(catalog.refresh().is_empty());
        assert!(!catalog.is_supported());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_polls_for_late_voices() {
        let host = Arc::new(MockHost::new(Vec::new()).without_change_events());
        let catalog = VoiceCatalog::new(
            host.clone(),
            policy(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ],
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = catalog.subscribe(move |voices| sink.lock().push(voices.len()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(seen.lock().is_empty());

        host.set_voices_silently(vec![Voice::new("Samantha", "en-US", true)]);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(*seen.lock(), vec![1]);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(*seen.lock(), vec![1]);
        assert!(subscription.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_follows_change_events() {
        let host = Arc::new(MockHost::new(Vec::new()));
        let catalog = VoiceCatalog::new(host.clone(), policy(), Vec::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = catalog.subscribe(move |voices| sink.lock().push(voices.len()));

        host.set_voices(vec![
            Voice::new("Samantha", "en-US", true),
            Voice::new("Amelie", "fr-FR", true),
        ]);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen.lock(), vec![2]);
        assert_eq!(catalog.voices().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_reports_initial_list() {
        let host = Arc::new(MockHost::new(vec![Voice::new("Samantha", "en-US", true)]));
        let catalog = VoiceCatalog::new(host, policy(), Vec::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = catalog.subscribe(move |voices| sink.lock().push(voices.len()));

        assert_eq!(*seen.lock(), vec![1]);
    }
}
