//! Error types shared by the scheduling engine and its collaborators.

use thiserror::Error;

/// Errors raised while decoding stored values into model types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Schedule recording type discriminant is unknown.
    #[error("Unknown schedule recording type: {0}")]
    UnknownRecordingType(i32),

    /// Rule recording type discriminant is unknown.
    #[error("Unknown rule recording type: {0}")]
    UnknownRuleRecordingType(i32),

    /// Keep method discriminant is unknown.
    #[error("Unknown keep method: {0}")]
    UnknownKeepMethod(i32),

    /// Episode management scheme discriminant is unknown.
    #[error("Unknown episode management scheme: {0}")]
    UnknownEpisodeManagement(i32),

    /// Episode info fallback discriminant is unknown.
    #[error("Unknown episode info fallback: {0}")]
    UnknownEpisodeInfoFallback(i32),

    /// Weekday number outside 1..=7.
    #[error("Invalid weekday number: {0}")]
    InvalidWeekday(i32),
}

/// Errors reported by collaborators (card, channel, program, schedule,
/// rule, conflict and recording providers).
///
/// "Not found" is never an error: providers return `Option` or `bool` for
/// an expected absence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The collaborator could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The backing store rejected or failed the request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("Invalid stored value: {0}")]
    Invalid(#[from] ProtocolError),
}

/// Result alias for collaborator calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
