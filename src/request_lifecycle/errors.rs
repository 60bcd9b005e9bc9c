use thiserror::Error;

use crate::request_lifecycle::types::{RequestId, Role, State};

/// Errors surfaced to callers of the transition executor
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Unknown request state: {0}")]
    InvalidState(String),

    #[error("Unknown actor role: {0}")]
    InvalidRole(String),

    #[error("Role {role} may not move a request from {from} to {to}")]
    Forbidden { from: State, to: State, role: Role },

    #[error("A reason is required to move a request from {from} to {to}")]
    ReasonRequired { from: State, to: State },

    #[error("Invalid container number: {0}")]
    InvalidContainerNumber(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl TransitionError {
    /// True when the caller cannot tell whether the transition was applied
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            TransitionError::Persistence(StoreError::Unavailable { .. } | StoreError::Corrupted(_))
        )
    }

    /// True for optimistic concurrency failures a caller may retry after re-reading
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::Persistence(StoreError::Conflict { .. }))
    }
}

/// Errors reported by a request store
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Request {request_id} is {actual}, expected {expected}")]
    Conflict {
        request_id: RequestId,
        expected: State,
        actual: State,
    },

    #[error("Request store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Stored request is corrupted: {0}")]
    Corrupted(String),
}

/// Errors reported by the collaboration channel service
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    #[error("Channel service unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to create channel for request {0}")]
    CreationFailed(RequestId),

    #[error("Failed to post message: {0}")]
    PostFailed(String),
}

/// Errors reported by the audit sink
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuditError {
    #[error("Audit sink rejected event {event_name}: {reason}")]
    Rejected { event_name: String, reason: String },

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}
