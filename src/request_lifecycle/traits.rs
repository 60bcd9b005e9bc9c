// Traits for dependency injection - the orchestrator's external collaborators

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::request_lifecycle::errors::{AuditError, ChannelError, StoreError};
use crate::request_lifecycle::types::{AuditEvent, ChannelHandle, Request, RequestId, StatusUpdate};

/// Durable request storage
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Fetch a request with its full history
    async fn get(&self, id: &RequestId) -> Result<Request, StoreError>;

    /// Atomically set the status, append history entries and apply the patch.
    ///
    /// Must fail with [`StoreError::Conflict`] and write nothing when the stored
    /// status differs from `update.expected_status`.
    async fn update_status_and_append_history(
        &self,
        id: &RequestId,
        update: StatusUpdate,
    ) -> Result<Request, StoreError>;
}

/// Structured audit trail
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Per-request collaboration threads
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ChannelService: Send + Sync {
    /// Resolve the request's channel, creating it if absent
    async fn get_or_create_channel(&self, request_id: &RequestId) -> Result<ChannelHandle, ChannelError>;

    async fn post_system_message(&self, channel: &ChannelHandle, text: &str) -> Result<(), ChannelError>;
}
