//! Engine and source error types.
//!
//! `SourceError` is defined in `adaptest-core` so the engine can classify
//! supplementary fetch failures without string matching.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{QuestionType, Subject};

/// Errors surfaced by the examination engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The session was finalized; no further answers or reports.
    #[error("session {0} is closed")]
    SessionClosed(Uuid),

    /// The selector exhausted its widening ladder.
    #[error("no question available for {subject} ({question_type})")]
    NoQuestionAvailable {
        subject: Subject,
        question_type: QuestionType,
    },

    /// An answer was submitted while no question was being shown.
    #[error("no question is awaiting an answer")]
    NoActiveQuestion,

    /// The session configuration cannot drive a session.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur when fetching supplementary questions.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested endpoint or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The source returned an error response.
    #[error("source error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The payload could not be decoded into questions.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl SourceError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SourceError::Unauthorized(_) | SourceError::NotFound(_) | SourceError::InvalidPayload(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            SourceError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors() {
        assert!(SourceError::Unauthorized("bad key".into()).is_permanent());
        assert!(SourceError::NotFound("/questions".into()).is_permanent());
        assert!(!SourceError::Timeout(30).is_permanent());
        assert!(!SourceError::RateLimited { retry_after_ms: 10 }.is_permanent());
    }

    #[test]
    fn retry_hint_only_for_rate_limits() {
        assert_eq!(
            SourceError::RateLimited { retry_after_ms: 250 }.retry_after_ms(),
            Some(250)
        );
        assert_eq!(SourceError::Network("reset".into()).retry_after_ms(), None);
    }

    #[test]
    fn exhaustion_message_names_slot() {
        let err = EngineError::NoQuestionAvailable {
            subject: Subject::Mathematics,
            question_type: QuestionType::Multiple,
        };
        assert_eq!(
            err.to_string(),
            "no question available for mathematics (multiple)"
        );
    }
}
