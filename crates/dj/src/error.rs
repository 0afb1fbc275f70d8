//! Error types for the DJ engine and analyzer.

use std::path::PathBuf;

use thiserror::Error;

use crate::deck::DeckId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DjError>;

/// Errors surfaced by the analyzer and the playback engine.
///
/// Every variant renders a message suitable for showing to the operator.
#[derive(Debug, Clone, Error)]
pub enum DjError {
    /// Unsupported or corrupt media.
    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Buffer too short or too quiet to analyze.
    #[error("insufficient audio for analysis: {reason}")]
    InsufficientAudio { reason: String },

    /// Metadata lookup miss.
    #[error("track not found: {}", path.display())]
    TrackNotFound { path: PathBuf },

    /// Media failure while starting or running playback.
    #[error("playback failed on deck {deck}: {reason}")]
    Playback { deck: DeckId, reason: String },

    /// Out-of-range argument, rejected before any state changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another operation is still in flight on the deck.
    #[error("deck {deck} is busy: {operation} already in progress")]
    Busy {
        deck: DeckId,
        operation: &'static str,
    },

    /// Settings file could not be read, parsed or written.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DjError {
    /// Stable short code for UIs and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::InsufficientAudio { .. } => "insufficient_audio",
            Self::TrackNotFound { .. } => "track_not_found",
            Self::Playback { .. } => "playback",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Busy { .. } => "busy",
            Self::Config(_) => "config",
        }
    }

    /// Whether the process can keep going after this error.
    ///
    /// All variants are scoped to a single operation; only configuration
    /// failures leave the engine without usable settings.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientAudio {
            reason: reason.into(),
        }
    }

    pub(crate) fn playback(deck: DeckId, reason: impl ToString) -> Self {
        Self::Playback {
            deck,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
