//! Voice descriptors and language-tag helpers.

use serde::{Deserialize, Serialize};

/// A voice exposed by the speech host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Unique display name within the catalog
    pub name: String,
    /// BCP-47-like tag, e.g. `en-US`
    pub language_tag: String,
    /// Local/system synthesis (as opposed to network-backed)
    pub is_local: bool,
    /// Host default voice
    #[serde(default)]
    pub is_default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, language_tag: impl Into<String>, is_local: bool) -> Self {
        Self {
            name: name.into(),
            language_tag: language_tag.into(),
            is_local,
            is_default: false,
        }
    }

    pub fn with_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Primary language subtag, lowercased (`fr` for `fr-FR`).
    pub fn primary_language(&self) -> String {
        primary_subtag(&self.language_tag)
    }

    /// Exact tag comparison, tolerant of case and `_` separators.
    pub fn matches_tag(&self, tag: &str) -> bool {
        normalize_tag(&self.language_tag) == normalize_tag(tag)
    }

    /// Same primary language as `tag`.
    pub fn matches_language(&self, tag: &str) -> bool {
        self.primary_language() == primary_subtag(tag)
    }

    pub fn is_english(&self) -> bool {
        self.primary_language() == "en"
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.language_tag)
    }
}

/// Lowercase a tag and use `-` as separator.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

pub fn primary_subtag(tag: &str) -> String {
    normalize_tag(tag)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_language() {
        assert_eq!(Voice::new("A", "fr-FR", true).primary_language(), "fr");
        assert_eq!(Voice::new("B", "EN_gb", true).primary_language(), "en");
        assert_eq!(Voice::new("C", "ja", true).primary_language(), "ja");
    }

    #[test]
    fn test_tag_matching() {
        let voice = Voice::new("Amelie", "fr-FR", true);
        assert!(voice.matches_tag("fr_fr"));
        assert!(!voice.matches_tag("fr-CA"));
        assert!(voice.matches_language("fr-CA"));
        assert!(voice.matches_language("fr"));
        assert!(!voice.matches_language("en"));
    }

    #[test]
    fn test_display() {
        let voice = Voice::new("Samantha", "en-US", true);
        assert_eq!(voice.to_string(), "Samantha (en-US)");
    }
}
