//! Translation targets offered to the user.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationLanguage {
    /// ISO 639-1 code, also used as the speech target language
    pub code: &'static str,
    pub name: &'static str,
    /// Name sent to the proxy as `langModel`
    pub model: &'static str,
}

pub const LANGUAGES: &[TranslationLanguage] = &[
    TranslationLanguage { code: "fr", name: "French", model: "French" },
    TranslationLanguage { code: "es", name: "Spanish", model: "Spanish" },
    TranslationLanguage { code: "de", name: "German", model: "German" },
    TranslationLanguage { code: "it", name: "Italian", model: "Italian" },
    TranslationLanguage { code: "zh", name: "Chinese", model: "Chinese" },
    TranslationLanguage { code: "ar", name: "Arabic", model: "Arabic" },
    TranslationLanguage { code: "ru", name: "Russian", model: "Russian" },
    TranslationLanguage { code: "ja", name: "Japanese", model: "Japanese" },
    TranslationLanguage { code: "pt", name: "Portuguese", model: "Portuguese" },
];

pub const DEFAULT_TARGET: &str = "fr";

/// Look up by code (`fr`, `FR`, `fr-CA`) or by name (`French`).
pub fn lookup(code_or_name: &str) -> Option<&'static TranslationLanguage> {
    let wanted = code_or_name.trim();
    let primary = wanted
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|l| l.code == primary || l.name.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("fr").map(|l| l.model), Some("French"));
        assert_eq!(lookup("PT-br").map(|l| l.model), Some("Portuguese"));
        assert_eq!(lookup("japanese").map(|l| l.code), Some("ja"));
        assert!(lookup("xx").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_default_target_listed() {
        assert!(lookup(DEFAULT_TARGET).is_some());
    }
}
