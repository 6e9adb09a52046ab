//! Error types for Dialogbank

use thiserror::Error;

/// Result type alias for Dialogbank operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the audio and speech pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Capture buffer was closed
    #[error("capture closed")]
    CaptureClosed,

    /// Capture device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech synthesis request failed (network, HTTP status, timeout)
    #[error("synthesis request failed: {0}")]
    Synthesis(String),

    /// Speech synthesis was cancelled before completion
    #[error("synthesis cancelled")]
    SynthesisCancelled,

    /// External player failed to spawn or exited unsuccessfully
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio cache read or write failed
    #[error("cache io error: {0}")]
    CacheIo(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Dialogue engine error
    #[error("dialogue error: {0}")]
    Dialogue(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error talking to a synthesis provider
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CaptureClosed,
    SynthesisRequestFailed,
    SynthesisCancelled,
    PlaybackProcessFailed,
    CacheIo,
    Other,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CaptureClosed => ErrorKind::CaptureClosed,
            Self::Synthesis(_) | Self::Http(_) => ErrorKind::SynthesisRequestFailed,
            Self::SynthesisCancelled => ErrorKind::SynthesisCancelled,
            Self::Playback(_) => ErrorKind::PlaybackProcessFailed,
            Self::CacheIo(_) => ErrorKind::CacheIo,
            Self::Audio(_)
            | Self::Recognition(_)
            | Self::Dialogue(_)
            | Self::Config(_)
            | Self::Io(_) => ErrorKind::Other,
        }
    }
}
