//! Error types for Pollcast core operations.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in poll and vote operations.
///
/// Everything except [`Error::Storage`] and [`Error::Serialization`] is a
/// caller-recoverable condition and is safe to surface verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// Poll id unknown
    #[error("poll not found")]
    NotFound,

    /// Poll is inactive or past its end date
    #[error("poll is closed")]
    PollClosed,

    /// Anonymous vote on a login-gated poll
    #[error("login required to vote on this poll")]
    LoginRequired,

    /// Malformed or invalid selection, missing text, bad poll definition
    #[error("validation error: {0}")]
    Validation(String),

    /// Re-voting is disabled and this identity already voted
    #[error("already voted on this poll")]
    DuplicateVote,

    /// Results are hidden from everyone but the creator
    #[error("results are hidden for this poll")]
    ResultsHidden,

    /// Non-creator tried to mutate a poll
    #[error("not authorized to modify this poll")]
    Forbidden,

    /// Storage backend fault
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization fault
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True for faults that are not the caller's doing.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Serialization(_))
    }

    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound => "NOT_FOUND",
            Error::PollClosed => "POLL_CLOSED",
            Error::LoginRequired => "LOGIN_REQUIRED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::DuplicateVote => "DUPLICATE_VOTE",
            Error::ResultsHidden => "RESULTS_HIDDEN",
            Error::Forbidden => "FORBIDDEN",
            Error::Storage(_) | Error::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_classification() {
        assert!(Error::Storage("disk".into()).is_internal());
        assert!(!Error::DuplicateVote.is_internal());
        assert!(!Error::validation("bad").is_internal());
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::NotFound.kind(), "NOT_FOUND");
        assert_eq!(Error::Storage("x".into()).kind(), "INTERNAL_ERROR");
        assert_eq!(Error::ResultsHidden.kind(), "RESULTS_HIDDEN");
    }
}
