//! Error taxonomy for the interview core.
//!
//! Callers (the web layer) only need [`InterviewError::is_client_error`] to
//! decide between a client and a server response; everything else is carried
//! through unchanged so it can be logged.

use std::time::Duration;
use uuid::Uuid;

/// Failures raised while asking the external model for the next turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnGeneratorError {
    #[error("turn generator request failed: {0}")]
    Transport(String),
    #[error("turn generator returned malformed output: {0}")]
    Malformed(String),
    #[error("turn generator did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("turn generation was cancelled")]
    Cancelled,
}

/// Failures raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("conversation {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("stored data is inconsistent: {0}")]
    Corrupt(String),
}

impl RepositoryError {
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage(err.into())
    }
}

/// Top-level error returned by the orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("interview {0} not found")]
    InterviewNotFound(Uuid),
    #[error(transparent)]
    TurnGenerator(#[from] TurnGeneratorError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("conversation {conversation_id} has no questions under topic {topic}")]
    IncompleteState { conversation_id: Uuid, topic: u32 },
}

impl InterviewError {
    /// True when the caller sent something unusable, as opposed to an
    /// upstream (generator or storage) failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ConversationNotFound(_) | Self::InterviewNotFound(_)
        )
    }
}

pub type Result<T, E = InterviewError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_distinguished_from_upstream_failures() {
        let id = Uuid::new_v4();
        assert!(InterviewError::Validation("empty".into()).is_client_error());
        assert!(InterviewError::ConversationNotFound(id).is_client_error());
        assert!(InterviewError::InterviewNotFound(id).is_client_error());

        assert!(!InterviewError::from(TurnGeneratorError::Cancelled).is_client_error());
        assert!(!InterviewError::from(RepositoryError::Conflict(id)).is_client_error());
        assert!(
            !InterviewError::IncompleteState {
                conversation_id: id,
                topic: 1
            }
            .is_client_error()
        );
    }

    #[test]
    fn test_error_display() {
        let err = InterviewError::from(TurnGeneratorError::Malformed("missing field".into()));
        assert_eq!(
            err.to_string(),
            "turn generator returned malformed output: missing field"
        );

        let storage = RepositoryError::storage("connection reset");
        assert_eq!(storage.to_string(), "storage failure: connection reset");
    }
}
