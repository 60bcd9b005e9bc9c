// Best-effort transitions fired by document uploads - never fail the upload

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::request_lifecycle::executor::{TransitionExecutor, TransitionReceipt};
use crate::request_lifecycle::types::{Actor, Request, RequestId, RequestType, State, TransitionRequest};

/// Categories of uploaded documents the orchestrator cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Supplement,
    ExportDocument,
    /// Any other attachment; never triggers a transition
    Other,
}

/// Outcome of an automatic transition attempt
#[derive(Debug, Clone)]
pub enum AutoTransitionOutcome {
    Applied(Box<TransitionReceipt>),
    /// No rule lets this actor take the edge, or the document does not trigger one
    NotApplicable,
    /// The executor refused or failed; logged and swallowed
    Failed(String),
}

impl AutoTransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, AutoTransitionOutcome::Applied(_))
    }
}

/// Reasons recorded on automatic transitions
#[derive(Debug, Clone)]
pub struct TriggerReasons {
    pub supplement: String,
    pub export_document: String,
}

impl Default for TriggerReasons {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for TriggerReasons {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            supplement: config.supplement_reason.clone(),
            export_document: config.export_document_reason.clone(),
        }
    }
}

pub struct AutoTransitionTrigger {
    executor: Arc<TransitionExecutor>,
    reasons: TriggerReasons,
}

impl AutoTransitionTrigger {
    pub fn new(executor: Arc<TransitionExecutor>) -> Self {
        Self {
            executor,
            reasons: TriggerReasons::default(),
        }
    }

    pub fn with_reasons(mut self, reasons: TriggerReasons) -> Self {
        self.reasons = reasons;
        self
    }

    /// Attempt `from -> to` for `actor`; every failure is logged, none is returned
    pub async fn try_auto_transition(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        from: State,
        to: State,
        reason: &str,
    ) -> AutoTransitionOutcome {
        self.attempt(actor, request_id, TransitionRequest::new(from, to).with_reason(reason))
            .await
    }

    /// Wire an uploaded document to the transition it implies, if any
    pub async fn on_document_uploaded(
        &self,
        actor: &Actor,
        request: &Request,
        kind: DocumentKind,
        document_id: &str,
    ) -> AutoTransitionOutcome {
        let target = match (kind, request.status) {
            (DocumentKind::Supplement, State::Scheduled | State::ScheduledInfoAdded) => {
                Some((State::Forwarded, self.reasons.supplement.as_str()))
            }
            (DocumentKind::ExportDocument, State::PickContainer)
                if request.request_type == RequestType::Export =>
            {
                Some((State::Scheduled, self.reasons.export_document.as_str()))
            }
            _ => None,
        };

        let Some((to, reason)) = target else {
            debug!(
                request_id = %request.id,
                status = %request.status,
                kind = ?kind,
                "Uploaded document does not trigger a transition"
            );
            self.executor.metrics().record_auto_skipped();
            return AutoTransitionOutcome::NotApplicable;
        };

        let transition = TransitionRequest::new(request.status, to)
            .with_reason(reason)
            .with_metadata("document_id", json!(document_id))
            .with_metadata("document_kind", json!(kind));
        self.attempt(actor, &request.id, transition).await
    }

    async fn attempt(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        transition: TransitionRequest,
    ) -> AutoTransitionOutcome {
        let (from, to) = (transition.from, transition.to);
        let metrics = self.executor.metrics();

        if !self.executor.graph().can_transition(from, to, actor.role) {
            debug!(
                request_id = %request_id,
                from = %from,
                to = %to,
                role = %actor.role,
                "Auto-transition not permitted for this actor, skipping"
            );
            metrics.record_auto_skipped();
            return AutoTransitionOutcome::NotApplicable;
        }

        match self.executor.execute(actor, request_id, transition).await {
            Ok(receipt) => {
                metrics.record_auto_applied();
                info!(request_id = %request_id, from = %from, to = %to, "Auto-transition applied");
                AutoTransitionOutcome::Applied(Box::new(receipt))
            }
            Err(e) => {
                metrics.record_auto_failed();
                warn!(
                    request_id = %request_id,
                    from = %from,
                    to = %to,
                    error = %e,
                    "Auto-transition failed; upload is unaffected"
                );
                AutoTransitionOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_lifecycle::graph::StateGraph;
    use crate::request_lifecycle::memory::{InMemoryAuditSink, InMemoryChannelService, InMemoryRequestStore};
    use crate::request_lifecycle::traits::RequestStore;
    use crate::request_lifecycle::types::Role;

    struct Fixture {
        store: Arc<InMemoryRequestStore>,
        trigger: AutoTransitionTrigger,
        executor: Arc<TransitionExecutor>,
    }

    async fn fixture(request: Request) -> Fixture {
        let store = Arc::new(InMemoryRequestStore::new());
        store.insert(request).await;
        let executor = Arc::new(TransitionExecutor::new(
            Arc::new(StateGraph::depot()),
            store.clone(),
            Arc::new(InMemoryAuditSink::new()),
            Arc::new(InMemoryChannelService::new()),
        ));
        Fixture {
            store,
            trigger: AutoTransitionTrigger::new(executor.clone()),
            executor,
        }
    }

    fn request_in(status: State, request_type: RequestType) -> Request {
        let mut request = Request::new(RequestId::new("req-1"), request_type);
        request.status = status;
        request
    }

    #[tokio::test]
    async fn test_supplement_forwards_scheduled_request() {
        let request = request_in(State::Scheduled, RequestType::Import);
        let f = fixture(request.clone()).await;
        let customer = Actor::new("cust-1", Role::CustomerUser);

        let outcome = f
            .trigger
            .on_document_uploaded(&customer, &request, DocumentKind::Supplement, "doc-1")
            .await;
        assert!(outcome.is_applied());

        let stored = f.store.get(&request.id).await.unwrap();
        assert_eq!(stored.status, State::Forwarded);
        assert!(stored.forwarded_at.is_some());
        let entry = stored.history.last().unwrap();
        assert_eq!(entry.reason.as_deref(), Some("Supplement document uploaded"));
        assert_eq!(entry.metadata.as_ref().unwrap()["document_id"], "doc-1");
    }

    #[tokio::test]
    async fn test_export_document_only_schedules_export_requests() {
        let import = request_in(State::PickContainer, RequestType::Import);
        let f = fixture(import.clone()).await;
        let customer = Actor::new("cust-1", Role::CustomerAdmin);

        let outcome = f
            .trigger
            .on_document_uploaded(&customer, &import, DocumentKind::ExportDocument, "doc-2")
            .await;
        assert!(matches!(outcome, AutoTransitionOutcome::NotApplicable));
        assert_eq!(f.store.get(&import.id).await.unwrap().status, State::PickContainer);

        let export = request_in(State::PickContainer, RequestType::Export);
        let f = fixture(export.clone()).await;
        let outcome = f
            .trigger
            .on_document_uploaded(&customer, &export, DocumentKind::ExportDocument, "doc-2")
            .await;
        assert!(outcome.is_applied());
        assert_eq!(f.store.get(&export.id).await.unwrap().status, State::Scheduled);
    }

    #[tokio::test]
    async fn test_role_without_edge_is_a_silent_no_op() {
        let request = request_in(State::Scheduled, RequestType::Import);
        let f = fixture(request.clone()).await;
        let driver = Actor::new("drv-1", Role::Driver);

        let outcome = f
            .trigger
            .try_auto_transition(&driver, &request.id, State::Scheduled, State::Forwarded, "upload")
            .await;

        assert!(matches!(outcome, AutoTransitionOutcome::NotApplicable));
        let stored = f.store.get(&request.id).await.unwrap();
        assert_eq!(stored.status, State::Scheduled);
        assert!(stored.history.is_empty());
        assert_eq!(f.executor.metrics().snapshot().auto_skipped, 1);
    }

    #[tokio::test]
    async fn test_executor_failure_is_swallowed() {
        // Stored status moved on since the caller read it
        let request = request_in(State::Forwarded, RequestType::Import);
        let f = fixture(request.clone()).await;
        let customer = Actor::new("cust-1", Role::CustomerUser);

        let outcome = f
            .trigger
            .try_auto_transition(&customer, &request.id, State::Scheduled, State::Forwarded, "upload")
            .await;

        assert!(matches!(outcome, AutoTransitionOutcome::Failed(_)));
        assert_eq!(f.store.get(&request.id).await.unwrap().status, State::Forwarded);
        assert_eq!(f.executor.metrics().snapshot().auto_failed, 1);
    }

    #[tokio::test]
    async fn test_other_documents_never_trigger() {
        let request = request_in(State::Scheduled, RequestType::Import);
        let f = fixture(request.clone()).await;
        let customer = Actor::new("cust-1", Role::CustomerUser);

        let outcome = f
            .trigger
            .on_document_uploaded(&customer, &request, DocumentKind::Other, "doc-9")
            .await;
        assert!(matches!(outcome, AutoTransitionOutcome::NotApplicable));
    }
}
