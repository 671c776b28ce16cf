//! Error taxonomy shared by playback and the transform client.
//!
//! Every variant maps to a stable `kind()` string and a message that can be
//! shown to the user as-is.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadEasyError {
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Speech unsupported: {0}")]
    Unsupported(String),

    #[error("Playback failed (voice {voice:?}): {message}")]
    Playback {
        voice: Option<String>,
        message: String,
    },

    #[error("Transform request timed out after {0}ms")]
    UpstreamTimeout(u64),

    #[error("Upstream returned {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    #[error("Upstream model still loading")]
    UpstreamLoading,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ReadEasyError {
    fn from(e: std::io::Error) -> Self {
        ReadEasyError::Io(e.to_string())
    }
}

impl ReadEasyError {
    /// Stable identifier for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadEasyError::InputInvalid(_) => "input_invalid",
            ReadEasyError::Unsupported(_) => "unsupported",
            ReadEasyError::Playback { .. } => "playback_error",
            ReadEasyError::UpstreamTimeout(_) => "upstream_timeout",
            ReadEasyError::Upstream { .. } => "upstream_error",
            ReadEasyError::UpstreamLoading => "upstream_loading",
            ReadEasyError::Config(_) => "config_error",
            ReadEasyError::Io(_) => "io_error",
        }
    }

    /// Check if retrying the same action later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fix the input first
            ReadEasyError::InputInvalid(_) => false,
            // No speech engine, nothing to retry against
            ReadEasyError::Unsupported(_) => false,
            ReadEasyError::Playback { .. } => true,
            ReadEasyError::UpstreamTimeout(_) => true,
            ReadEasyError::Upstream { status, .. } => *status >= 500,
            ReadEasyError::UpstreamLoading => true,
            ReadEasyError::Config(_) => false,
            ReadEasyError::Io(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ReadEasyError::InputInvalid(reason) => format!("Nothing to do: {reason}."),
            ReadEasyError::Unsupported(_) => {
                "Text-to-speech is not available in this environment.".to_string()
            }
            ReadEasyError::Playback { .. } => {
                "Speech playback failed. Try another voice or press play again.".to_string()
            }
            ReadEasyError::UpstreamTimeout(_) => {
                "Request timed out. The text may be too long, try a shorter input or summarize first."
                    .to_string()
            }
            ReadEasyError::Upstream {
                status,
                message,
                detail,
            } => {
                // Upstream detail can carry provider internals; only show it in dev builds
                match detail {
                    Some(detail) if cfg!(debug_assertions) => {
                        format!("Processing failed ({status}): {message} ({detail})")
                    }
                    _ => format!("Processing failed ({status}): {message}"),
                }
            }
            ReadEasyError::UpstreamLoading => {
                "The AI model is still warming up. Please try again in a minute.".to_string()
            }
            ReadEasyError::Config(_) => "Configuration error. Please check settings.".to_string(),
            ReadEasyError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReadEasyError>;
