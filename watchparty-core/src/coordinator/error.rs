//! Coordinator errors

use thiserror::Error;

/// Errors surfaced by request-shaped coordinator operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid control event: {0}")]
    InvalidEvent(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

impl CoordinatorError {
    /// Stable machine-readable code, used in `join_rejected` payloads
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::AlreadyExists(_) => "already_exists",
            CoordinatorError::InvalidEvent(_) => "invalid_event",
            CoordinatorError::InvalidSession(_) => "invalid_session",
        }
    }
}

/// A single participant could not be reached during a broadcast.
///
/// Never fails the operation that triggered the broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to participant {participant_id} failed")]
pub struct DeliveryFailure {
    pub participant_id: String,
}
