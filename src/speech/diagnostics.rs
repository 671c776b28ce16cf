//! Speech diagnostics: what the host offers, grouped by language.

use std::collections::BTreeMap;
use std::fmt;

use super::catalog::ReliabilityPolicy;
use super::voice::Voice;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechReport {
    pub supported: bool,
    pub total: usize,
    pub reliable: usize,
    /// Primary language → voices
    pub by_language: BTreeMap<String, Vec<Voice>>,
    pub warnings: Vec<String>,
}

impl SpeechReport {
    pub fn build(supported: bool, voices: &[Voice], policy: &ReliabilityPolicy) -> Self {
        let mut by_language: BTreeMap<String, Vec<Voice>> = BTreeMap::new();
        for voice in voices {
            by_language
                .entry(voice.primary_language())
                .or_default()
                .push(voice.clone());
        }
        let reliable = voices.iter().filter(|v| policy.is_reliable(v)).count();

        let mut warnings = Vec::new();
        if !supported {
            warnings.push("Speech synthesis is not supported on this system".to_string());
        } else if voices.is_empty() {
            warnings.push("No voices found; the speech engine may still be loading".to_string());
        } else if reliable == 0 {
            warnings.push(
                "No local voices found; network voices may fail or stop mid-sentence".to_string(),
            );
        }
        for (language, group) in &by_language {
            if !group.iter().any(|v| policy.is_reliable(v)) && reliable > 0 {
                warnings.push(format!("Only network voices for '{language}'"));
            }
        }

        Self {
            supported,
            total: voices.len(),
            reliable,
            by_language,
            warnings,
        }
    }
}

impl fmt::Display for SpeechReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Speech supported: {}", if self.supported { "yes" } else { "no" })?;
        writeln!(f, "Voices: {} ({} local)", self.total, self.reliable)?;
        for (language, voices) in &self.by_language {
            writeln!(f, "  [{language}]")?;
            for voice in voices {
                let mut flags = Vec::new();
                if voice.is_local {
                    flags.push("local");
                } else {
                    flags.push("network");
                }
                if voice.is_default {
                    flags.push("default");
                }
                writeln!(f, "    {voice} {}", flags.join(", "))?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "WARNING: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_language() {
        let voices = vec![
            Voice::new("Samantha", "en-US", true),
            Voice::new("Daniel", "en-GB", true),
            Voice::new("Amelie", "fr-FR", true),
        ];
        let report = SpeechReport::build(true, &voices, &ReliabilityPolicy::default());
        assert_eq!(report.total, 3);
        assert_eq!(report.reliable, 3);
        assert_eq!(report.by_language["en"].len(), 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_warns_without_local_voices() {
        let voices = vec![Voice::new("Google US English", "en-US", false)];
        let report = SpeechReport::build(true, &voices, &ReliabilityPolicy::default());
        assert_eq!(report.reliable, 0);
        assert!(report.warnings[0].contains("No local voices"));
        assert!(report.to_string().contains("network"));
    }

    #[test]
    fn test_warns_per_language() {
        let voices = vec![
            Voice::new("Samantha", "en-US", true),
            Voice::new("Google français", "fr-FR", false),
        ];
        let report = SpeechReport::build(true, &voices, &ReliabilityPolicy::default());
        assert_eq!(report.warnings, vec!["Only network voices for 'fr'".to_string()]);
    }

    #[test]
    fn test_unsupported() {
        let report = SpeechReport::build(false, &[], &ReliabilityPolicy::default());
        assert!(report.to_string().contains("Speech supported: no"));
        assert_eq!(report.warnings.len(), 1);
    }
}
