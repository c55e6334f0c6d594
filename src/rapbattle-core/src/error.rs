//! Error types for the rap battle system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BattleError {
    #[error("Invalid participant count: expected {min}-{max}, got {actual}")]
    InvalidParticipantCount {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid round count: expected {min}-{max}, got {actual}")]
    InvalidRoundCount { min: u32, max: u32, actual: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Voice synthesis error: {0}")]
    VoiceError(String),

    #[error("Invalid battle transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the character backend.
///
/// The store branches on these variants to decide between surfacing the
/// error and falling back to the built-in character list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend URL or key is missing.
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    /// The backing table does not exist.
    #[error("backend schema missing: {0}")]
    NotFound(String),

    /// Network failure or unexpected response.
    #[error("backend request failed: {0}")]
    Transient(String),
}
