//! Configuration management for readeasy-rs.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to defaults field by field, so a partial file is fine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Target language for voice selection (BCP-47 tag or primary subtag)
    pub language: String,
    pub rate: f32,
    pub volume: f32,
    /// Pinned voice name; `None` lets the selector choose
    pub voice: Option<String>,
    /// Case-insensitive name fragments marking network-backed voices
    pub unreliable_patterns: Vec<String>,
    /// Re-poll schedule after subscribing to the voice catalog
    pub poll_delays_ms: Vec<u64>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            rate: 1.0,
            volume: 0.8,
            voice: None,
            unreliable_patterns: vec![
                "google".into(),
                "online".into(),
                "natural".into(),
                "cloud".into(),
            ],
            poll_delays_ms: vec![100, 500, 1000, 2000],
        }
    }
}

impl SpeechConfig {
    pub fn poll_delays(&self) -> Vec<Duration> {
        self.poll_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KokoroConfig {
    pub enabled: bool,
    pub model_path: String,
    pub voices_path: String,
    pub tokenizer_path: String,
}

impl Default for KokoroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: String::new(),
            voices_path: String::new(),
            tokenizer_path: String::new(),
        }
    }
}

impl KokoroConfig {
    /// Resolve a configured path, defaulting to `file_name` in the working directory.
    pub fn resolve(configured: &str, file_name: &str) -> PathBuf {
        if configured.is_empty() {
            std::env::current_dir()
                .unwrap_or_default()
                .join(file_name)
        } else {
            PathBuf::from(configured)
        }
    }

    pub fn model_file(&self) -> PathBuf {
        Self::resolve(&self.model_path, "kokoro-v1.0.onnx")
    }

    pub fn voices_file(&self) -> PathBuf {
        Self::resolve(&self.voices_path, "voices-v1.0.bin")
    }

    pub fn tokenizer_file(&self) -> PathBuf {
        Self::resolve(&self.tokenizer_path, "tokenizer.json")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Proxy endpoint accepting `{type, text, langModel}`
    pub endpoint: String,
    pub timeout_ms: u64,
    pub max_chars: usize,
    pub max_translate_chars: usize,
    pub loading_retry_delay_ms: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8888/.netlify/functions/gemini".into(),
            timeout_ms: 8000,
            max_chars: 4000,
            max_translate_chars: 3000,
            loading_retry_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub kokoro: KokoroConfig,
    pub transform: TransformConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/readeasy/config.yaml
    /// 3. /etc/readeasy/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/readeasy/config.yaml")),
                Some(PathBuf::from("/etc/readeasy/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.speech.language, "en");
        assert_eq!(config.speech.poll_delays_ms, vec![100, 500, 1000, 2000]);
        assert_eq!(config.transform.max_translate_chars, 3000);
        assert_eq!(config.transform.max_chars, 4000);
        assert_eq!(config.transform.timeout_ms, 8000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "speech:\n  language: fr-FR\n  rate: 1.5\ntransform:\n  timeout_ms: 9000\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.speech.language, "fr-FR");
        assert!((config.speech.rate - 1.5).abs() < f32::EPSILON);
        assert!((config.speech.volume - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.transform.timeout_ms, 9000);
        assert_eq!(config.transform.max_chars, 4000);
        assert!(config.kokoro.enabled);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load(Some(Path::new("/nonexistent/readeasy/config.yaml")));
        assert_eq!(config.speech.language, "en");
    }

    #[test]
    fn test_kokoro_paths() {
        let config = KokoroConfig {
            model_path: "/models/kokoro.onnx".into(),
            ..Default::default()
        };
        assert_eq!(config.model_file(), PathBuf::from("/models/kokoro.onnx"));
        assert!(config.voices_file().ends_with("voices-v1.0.bin"));
    }
}
