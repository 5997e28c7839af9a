//! Error types for reelkit core

use crate::bindings::HlsErrorKind;
use crate::types::BackendKind;
use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("No sources supplied")]
    NoSources,

    #[error("Source list mixes embedded players with other entries")]
    MixedSources,

    #[error("Invalid {provider} video ID: {input:?}")]
    InvalidId { provider: BackendKind, input: String },

    #[error("Source cannot be played on this host: {0}")]
    UnsupportedSource(String),

    // Script loading errors
    #[error("Failed to load script {url}: {reason}")]
    ScriptLoad { url: String, reason: String },

    #[error("Script {url} did not expose `{global}` in time")]
    ScriptTimeout { url: String, global: String },

    // Backend errors
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Unrecoverable {kind} error: {details}")]
    BackendFatal { kind: HlsErrorKind, details: String },

    #[error("{provider} player error: {message}")]
    Embed { provider: BackendKind, message: String },

    #[error("Operation not supported by the {0} backend")]
    NotSupported(BackendKind),

    #[error("Backend is not attached")]
    NotAttached,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a script load error
    pub fn script_load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ScriptLoad {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if re-supplying the same sources may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ScriptLoad { .. }
                | Error::ScriptTimeout { .. }
                | Error::Network(_)
                | Error::Backend(_)
        )
    }

    /// Returns the error code for logs and the CLI
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoSources => "NO_SOURCES",
            Error::MixedSources => "MIXED_SOURCES",
            Error::InvalidId { .. } => "INVALID_ID",
            Error::UnsupportedSource(_) => "UNSUPPORTED_SOURCE",
            Error::ScriptLoad { .. } => "SCRIPT_LOAD",
            Error::ScriptTimeout { .. } => "SCRIPT_TIMEOUT",
            Error::Backend(_) => "BACKEND",
            Error::BackendFatal { .. } => "BACKEND_FATAL",
            Error::Embed { .. } => "EMBED",
            Error::NotSupported(_) => "NOT_SUPPORTED",
            Error::NotAttached => "NOT_ATTACHED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Network(_) => "NETWORK",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
        }
    }
}
