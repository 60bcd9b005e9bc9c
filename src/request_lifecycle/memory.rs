//! In-memory collaborators.
//!
//! Used by the CLI demo and the test suites. Each one can be switched into a
//! failing mode to exercise the executor's partial-failure handling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::request_lifecycle::errors::{AuditError, ChannelError, StoreError};
use crate::request_lifecycle::traits::{AuditSink, ChannelService, RequestStore};
use crate::request_lifecycle::types::{AuditEvent, ChannelHandle, Request, RequestId, StatusUpdate};

/// Request store backed by a map; the status check and the write share one lock
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: Mutex<HashMap<RequestId, Request>>,
    unavailable: AtomicBool,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the CRUD service creating a request
    pub async fn insert(&self, request: Request) {
        self.requests
            .lock()
            .await
            .insert(request.id.clone(), request);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "in-memory store switched off".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn get(&self, id: &RequestId) -> Result<Request, StoreError> {
        self.check_available()?;
        self.requests
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_status_and_append_history(
        &self,
        id: &RequestId,
        update: StatusUpdate,
    ) -> Result<Request, StoreError> {
        self.check_available()?;
        let mut requests = self.requests.lock().await;
        let request = requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if request.status != update.expected_status {
            return Err(StoreError::Conflict {
                request_id: id.clone(),
                expected: update.expected_status,
                actual: request.status,
            });
        }

        request.status = update.new_status;
        request.history.extend(update.entries);
        request.apply_patch(&update.patch);
        Ok(request.clone())
    }
}

/// Audit sink that keeps every event it receives
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("in-memory audit sink switched off".to_string()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Channel service keeping one thread of system messages per request
#[derive(Debug, Default)]
pub struct InMemoryChannelService {
    channels: Mutex<HashMap<RequestId, ChannelThread>>,
    next_channel: AtomicU64,
    failing: AtomicBool,
}

#[derive(Debug, Clone)]
struct ChannelThread {
    handle: ChannelHandle,
    messages: Vec<String>,
}

impl InMemoryChannelService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn messages(&self, request_id: &RequestId) -> Vec<String> {
        self.channels
            .lock()
            .await
            .get(request_id)
            .map(|thread| thread.messages.clone())
            .unwrap_or_default()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    fn check_available(&self) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(
                "in-memory channel service switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelService for InMemoryChannelService {
    async fn get_or_create_channel(&self, request_id: &RequestId) -> Result<ChannelHandle, ChannelError> {
        self.check_available()?;
        let mut channels = self.channels.lock().await;
        let thread = channels.entry(request_id.clone()).or_insert_with(|| {
            let number = self.next_channel.fetch_add(1, Ordering::SeqCst) + 1;
            ChannelThread {
                handle: ChannelHandle {
                    channel_id: format!("channel-{number}"),
                    request_id: request_id.clone(),
                },
                messages: Vec::new(),
            }
        });
        Ok(thread.handle.clone())
    }

    async fn post_system_message(&self, channel: &ChannelHandle, text: &str) -> Result<(), ChannelError> {
        self.check_available()?;
        let mut channels = self.channels.lock().await;
        let thread = channels
            .get_mut(&channel.request_id)
            .filter(|thread| thread.handle == *channel)
            .ok_or_else(|| ChannelError::PostFailed(format!("unknown channel {}", channel.channel_id)))?;
        thread.messages.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_lifecycle::types::{HistoryEntry, RequestPatch, RequestType, State};
    use chrono::Utc;

    fn update(expected: State, new: State) -> StatusUpdate {
        StatusUpdate {
            expected_status: expected,
            new_status: new,
            entries: vec![HistoryEntry::transition("u1", expected, new, None, None, Utc::now())],
            patch: RequestPatch::default(),
        }
    }

    #[tokio::test]
    async fn test_store_compare_and_set() {
        let store = InMemoryRequestStore::new();
        let id = RequestId::new("r1");
        store.insert(Request::new(id.clone(), RequestType::Import)).await;

        let updated = store
            .update_status_and_append_history(&id, update(State::Pending, State::Scheduled))
            .await
            .unwrap();
        assert_eq!(updated.status, State::Scheduled);
        assert_eq!(updated.history.len(), 1);

        let err = store
            .update_status_and_append_history(&id, update(State::Pending, State::Scheduled))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { expected: State::Pending, actual: State::Scheduled, .. }
        ));
        assert_eq!(store.get(&id).await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn test_store_not_found_and_unavailable() {
        let store = InMemoryRequestStore::new();
        let id = RequestId::new("missing");
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));

        store.set_unavailable(true);
        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_is_created_once() {
        let channels = InMemoryChannelService::new();
        let id = RequestId::new("r1");

        let first = channels.get_or_create_channel(&id).await.unwrap();
        let second = channels.get_or_create_channel(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(channels.channel_count().await, 1);

        channels.post_system_message(&first, "hello").await.unwrap();
        assert_eq!(channels.messages(&id).await, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_channel_service() {
        let channels = InMemoryChannelService::new();
        channels.set_failing(true);
        assert!(channels
            .get_or_create_channel(&RequestId::new("r1"))
            .await
            .is_err());
        assert_eq!(channels.channel_count().await, 0);
    }
}
