//! Persisted user preferences.
//!
//! Stored as JSON in ~/.config/readeasy/preferences.json. Only the
//! screen-reader mode flag survives restarts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReadEasyError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub screen_reader_mode: bool,
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("readeasy").join("preferences.json"))
}

pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    /// Open the store at the standard location.
    pub fn open_default() -> Result<Self> {
        let path = default_path()
            .ok_or_else(|| ReadEasyError::Config("no user config directory".into()))?;
        Ok(Self::open(path))
    }

    /// Open the store at `path`. A missing or unreadable file yields defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = load(&path);
        Self { path, prefs }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn screen_reader_mode(&self) -> bool {
        self.prefs.screen_reader_mode
    }

    pub fn set_screen_reader_mode(&mut self, enabled: bool) -> Result<()> {
        self.prefs.screen_reader_mode = enabled;
        self.save()
    }

    /// Flip screen-reader mode, persist it and return the announcement.
    pub fn toggle_screen_reader_mode(&mut self) -> Result<&'static str> {
        let enabled = !self.prefs.screen_reader_mode;
        self.set_screen_reader_mode(enabled)?;
        Ok(announcement(enabled))
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.prefs)
            .map_err(|e| ReadEasyError::Config(format!("Failed to serialize preferences: {e}")))?;
        fs::write(&self.path, json)?;
        debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}

pub fn announcement(enabled: bool) -> &'static str {
    if enabled {
        "Screen reader mode enabled"
    } else {
        "Screen reader mode disabled"
    }
}

fn load(path: &Path) -> Preferences {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Preferences::default(),
    };
    match serde_json::from_str(&contents) {
        Ok(prefs) => prefs,
        Err(e) => {
            warn!("Ignoring malformed preferences at {}: {e}", path.display());
            Preferences::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json"));
        assert!(!store.screen_reader_mode());
    }

    #[test]
    fn test_toggle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let mut store = PreferenceStore::open(&path);
        assert_eq!(store.toggle_screen_reader_mode().unwrap(), "Screen reader mode enabled");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"screenReaderMode\": true"));

        let mut reopened = PreferenceStore::open(&path);
        assert!(reopened.screen_reader_mode());
        assert_eq!(reopened.toggle_screen_reader_mode().unwrap(), "Screen reader mode disabled");
        assert!(!PreferenceStore::open(&path).screen_reader_mode());
    }

    #[test]
    fn test_malformed_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();
        assert!(!PreferenceStore::open(&path).screen_reader_mode());
    }
}
