//! Error types for the voice companion core

use thiserror::Error;

use crate::voice::RecognitionError;

/// Result type alias for voice companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Permission a component may need from the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Microphone / speech recognition access
    Microphone,
    /// Posting user-visible notifications
    Notifications,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Microphone => write!(f, "microphone"),
            Self::Notifications => write!(f, "notifications"),
        }
    }
}

/// Errors that can occur in the voice companion
#[derive(Debug, Error)]
pub enum Error {
    /// Speech engine absent or unsupported on this host
    #[error("speech engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Transient recognition failure
    #[error("recognition error: {0}")]
    Recognition(RecognitionError),

    /// Platform refused a permission
    #[error("permission denied: {0}")]
    PermissionDenied(Permission),

    /// AI dialogue, extraction or persistence backend failure
    #[error("backend error: {0}")]
    Backend(String),

    /// A conversation session is already active
    #[error("a conversation is already active")]
    SessionConflict,

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio file transcription error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Platform notification error
    #[error("notification error: {0}")]
    Notification(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<RecognitionError> for Error {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::PermissionDenied => Self::PermissionDenied(Permission::Microphone),
            other => Self::Recognition(other),
        }
    }
}
