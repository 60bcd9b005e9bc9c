// End-to-end transition scenarios
// Drives the executor and auto-transition trigger against the in-memory collaborators

use depot_lifecycle::request_lifecycle::memory::{
    InMemoryAuditSink, InMemoryChannelService, InMemoryRequestStore,
};
use depot_lifecycle::request_lifecycle::{
    Actor, AutoTransitionOutcome, AutoTransitionTrigger, DocumentKind, NotificationOutcome,
    Request, RequestId, RequestStore, RequestType, Role, State, StateGraph, StoreError,
    TransitionError, TransitionExecutor, TransitionRequest,
};
use std::sync::Arc;

struct Depot {
    store: Arc<InMemoryRequestStore>,
    audit: Arc<InMemoryAuditSink>,
    channels: Arc<InMemoryChannelService>,
    executor: Arc<TransitionExecutor>,
}

impl Depot {
    fn new() -> Self {
        let store = Arc::new(InMemoryRequestStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let channels = Arc::new(InMemoryChannelService::new());
        let executor = Arc::new(TransitionExecutor::new(
            Arc::new(StateGraph::depot()),
            store.clone(),
            audit.clone(),
            channels.clone(),
        ));
        Self {
            store,
            audit,
            channels,
            executor,
        }
    }

    async fn request_in(&self, id: &str, status: State, request_type: RequestType) -> RequestId {
        let mut request = Request::new(RequestId::new(id), request_type);
        request.status = status;
        self.store.insert(request).await;
        RequestId::new(id)
    }

    async fn status(&self, id: &RequestId) -> State {
        self.store.get(id).await.unwrap().status
    }
}

fn sale_admin() -> Actor {
    Actor::new("sale-1", Role::SaleAdmin)
}

#[tokio::test]
async fn test_sale_admin_schedules_pending_request() {
    let depot = Depot::new();
    let id = depot.request_in("r-1", State::Pending, RequestType::Import).await;

    let receipt = depot
        .executor
        .execute(&sale_admin(), &id, TransitionRequest::new(State::Pending, State::Scheduled))
        .await
        .unwrap();

    assert_eq!(receipt.request.status, State::Scheduled);
    assert_eq!(receipt.notification, NotificationOutcome::Delivered);

    let stored = depot.store.get(&id).await.unwrap();
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].action, "SCHEDULED");
    assert_eq!(stored.history[0].by, "sale-1");

    let events = depot.audit.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "REQUEST.SCHEDULED");

    let messages = depot.channels.messages(&id).await;
    assert_eq!(
        messages,
        vec!["Your request has been accepted and an appointment is scheduled.".to_string()]
    );
}

#[tokio::test]
async fn test_rejection_without_reason_changes_nothing() {
    let depot = Depot::new();
    let id = depot.request_in("r-2", State::Pending, RequestType::Import).await;

    let err = depot
        .executor
        .execute(
            &sale_admin(),
            &id,
            TransitionRequest::new(State::Pending, State::Rejected).with_reason(""),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::ReasonRequired { .. }));
    let stored = depot.store.get(&id).await.unwrap();
    assert_eq!(stored.status, State::Pending);
    assert!(stored.history.is_empty());
    assert!(depot.audit.events().await.is_empty());
    assert_eq!(depot.channels.channel_count().await, 0);
}

#[tokio::test]
async fn test_customer_cannot_send_to_gate() {
    let depot = Depot::new();
    let id = depot.request_in("r-3", State::Scheduled, RequestType::Import).await;
    let customer = Actor::new("cust-1", Role::CustomerUser);

    let err = depot
        .executor
        .execute(&customer, &id, TransitionRequest::new(State::Scheduled, State::SentToGate))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransitionError::Forbidden {
            from: State::Scheduled,
            to: State::SentToGate,
            role: Role::CustomerUser
        }
    ));
    assert_eq!(depot.status(&id).await, State::Scheduled);
}

#[tokio::test]
async fn test_rejected_request_is_terminal() {
    let depot = Depot::new();
    let id = depot.request_in("r-4", State::Checking, RequestType::Import).await;

    let receipt = depot
        .executor
        .execute(
            &sale_admin(),
            &id,
            TransitionRequest::new(State::Checking, State::Rejected).with_reason("failed inspection"),
        )
        .await
        .unwrap();

    let rejection = receipt.request.rejection.as_ref().unwrap();
    assert_eq!(rejection.reason, "failed inspection");
    assert_eq!(rejection.by, "sale-1");
    assert_eq!(
        depot.channels.messages(&id).await,
        vec!["The request has been rejected. Reason: failed inspection".to_string()]
    );

    let graph = depot.executor.graph();
    for role in Role::ALL {
        assert!(graph.valid_transitions(State::Rejected, role).is_empty());
    }
}

#[tokio::test]
async fn test_forwarded_request_sent_back_to_scheduled() {
    let depot = Depot::new();
    let id = depot.request_in("r-5", State::Scheduled, RequestType::Import).await;
    let customer = Actor::new("cust-1", Role::CustomerUser);

    depot
        .executor
        .execute(&customer, &id, TransitionRequest::new(State::Scheduled, State::Forwarded))
        .await
        .unwrap();

    let err = depot
        .executor
        .execute(&sale_admin(), &id, TransitionRequest::new(State::Forwarded, State::Scheduled))
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::ReasonRequired { .. }));

    depot
        .executor
        .execute(
            &sale_admin(),
            &id,
            TransitionRequest::new(State::Forwarded, State::Scheduled)
                .with_reason("missing customs form"),
        )
        .await
        .unwrap();

    let stored = depot.store.get(&id).await.unwrap();
    assert_eq!(stored.status, State::Scheduled);
    let actions: Vec<&str> = stored.history.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["FORWARDED", "SCHEDULED"]);
    assert_eq!(stored.history[1].reason.as_deref(), Some("missing customs form"));
}

#[tokio::test]
async fn test_channel_outage_keeps_transition_committed() {
    let depot = Depot::new();
    let id = depot.request_in("r-6", State::SentToGate, RequestType::Import).await;
    depot.channels.set_failing(true);
    let security = Actor::new("gate-1", Role::Security);

    let receipt = depot
        .executor
        .execute(&security, &id, TransitionRequest::new(State::SentToGate, State::GateIn))
        .await
        .unwrap();

    assert!(matches!(receipt.notification, NotificationOutcome::Failed(_)));
    assert!(receipt.audit_recorded);
    assert_eq!(depot.status(&id).await, State::GateIn);
    assert_eq!(depot.store.get(&id).await.unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_store_outage_is_indeterminate() {
    let depot = Depot::new();
    let id = depot.request_in("r-7", State::Pending, RequestType::Import).await;
    depot.store.set_unavailable(true);

    let err = depot
        .executor
        .execute(&sale_admin(), &id, TransitionRequest::new(State::Pending, State::Scheduled))
        .await
        .unwrap_err();

    assert!(err.is_indeterminate());
    assert!(depot.audit.events().await.is_empty());
}

#[tokio::test]
async fn test_stale_from_state_is_a_conflict() {
    let depot = Depot::new();
    let id = depot.request_in("r-8", State::Scheduled, RequestType::Import).await;

    let err = depot
        .executor
        .execute(&sale_admin(), &id, TransitionRequest::new(State::Pending, State::Scheduled))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransitionError::Persistence(StoreError::Conflict {
            expected: State::Pending,
            actual: State::Scheduled,
            ..
        })
    ));
    assert!(depot.store.get(&id).await.unwrap().history.is_empty());
}

#[tokio::test]
async fn test_retry_after_commit_replays_with_same_key() {
    let depot = Depot::new();
    let id = depot.request_in("r-9", State::Pending, RequestType::Import).await;
    let transition = TransitionRequest::new(State::Pending, State::Scheduled)
        .with_idempotency_key("client-attempt-1");

    let first = depot
        .executor
        .execute(&sale_admin(), &id, transition.clone())
        .await
        .unwrap();
    let second = depot
        .executor
        .execute(&sale_admin(), &id, transition)
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.entry, first.entry);
    assert_eq!(depot.store.get(&id).await.unwrap().history.len(), 1);
    assert_eq!(depot.channels.messages(&id).await.len(), 1);

    let events = depot.audit.events().await;
    assert_eq!(events.len(), 2);
    assert!(events[0].payload.get("replayed").is_none());
    assert_eq!(events[1].payload["replayed"], true);
    assert_eq!(events[1].payload["idempotency_key"], "client-attempt-1");
}

#[tokio::test]
async fn test_replay_fills_audit_gap_left_by_failed_first_attempt() {
    let depot = Depot::new();
    let id = depot.request_in("r-9b", State::Pending, RequestType::Import).await;
    let transition = TransitionRequest::new(State::Pending, State::Scheduled)
        .with_idempotency_key("client-attempt-2");

    depot.audit.set_failing(true);
    let first = depot
        .executor
        .execute(&sale_admin(), &id, transition.clone())
        .await
        .unwrap();
    assert!(!first.audit_recorded);
    assert!(depot.audit.events().await.is_empty());

    depot.audit.set_failing(false);
    let retry = depot
        .executor
        .execute(&sale_admin(), &id, transition)
        .await
        .unwrap();

    assert!(retry.replayed);
    assert!(retry.audit_recorded);
    let events = depot.audit.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "REQUEST.SCHEDULED");
    assert_eq!(depot.store.get(&id).await.unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_assign_container_then_export_document_schedules() {
    let depot = Depot::new();
    let id = depot.request_in("r-10", State::Pending, RequestType::Export).await;

    depot
        .executor
        .assign_container(&sale_admin(), &id, State::Pending, "MSCU1234567")
        .await
        .unwrap();

    let request = depot.store.get(&id).await.unwrap();
    assert_eq!(request.status, State::PickContainer);
    assert_eq!(request.container_no.as_deref(), Some("MSCU1234567"));
    let actions: Vec<&str> = request.history.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["CONTAINER_ASSIGNED", "PICK_CONTAINER"]);

    let trigger = AutoTransitionTrigger::new(depot.executor.clone());
    let customer = Actor::new("cust-1", Role::CustomerAdmin);
    let outcome = trigger
        .on_document_uploaded(&customer, &request, DocumentKind::ExportDocument, "doc-1")
        .await;

    assert!(outcome.is_applied());
    assert_eq!(depot.status(&id).await, State::Scheduled);
}

#[tokio::test]
async fn test_auto_trigger_without_permission_is_silent() {
    let depot = Depot::new();
    let id = depot.request_in("r-11", State::Scheduled, RequestType::Import).await;
    let trigger = AutoTransitionTrigger::new(depot.executor.clone());
    let yard = Actor::new("yard-1", Role::YardManager);

    let outcome = trigger
        .try_auto_transition(&yard, &id, State::Scheduled, State::Forwarded, "Supplement uploaded")
        .await;

    assert!(matches!(outcome, AutoTransitionOutcome::NotApplicable));
    let stored = depot.store.get(&id).await.unwrap();
    assert_eq!(stored.status, State::Scheduled);
    assert!(stored.history.is_empty());
    assert!(depot.audit.events().await.is_empty());
}

#[tokio::test]
async fn test_full_import_history_forms_a_causal_chain() {
    let depot = Depot::new();
    let id = depot.request_in("r-12", State::Pending, RequestType::Import).await;
    let security = Actor::new("gate-1", Role::Security);
    let maintenance = Actor::new("maint-1", Role::MaintenanceManager);
    let customer = Actor::new("cust-1", Role::CustomerUser);
    let yard = Actor::new("yard-1", Role::YardManager);
    let driver = Actor::new("driver-1", Role::Driver);
    let system = depot.executor.system_actor();
    let sale = sale_admin();

    let steps = [
        (&sale, State::Pending, State::Scheduled),
        (&customer, State::Scheduled, State::Forwarded),
        (&system, State::Forwarded, State::SentToGate),
        (&security, State::SentToGate, State::GateIn),
        (&security, State::GateIn, State::Checking),
        (&maintenance, State::Checking, State::Checked),
        (&sale, State::Checked, State::PendingAccept),
        (&customer, State::PendingAccept, State::Accept),
        (&yard, State::Accept, State::Positioned),
        (&driver, State::Positioned, State::Forklifting),
        (&driver, State::Forklifting, State::InYard),
    ];
    for (actor, from, to) in steps {
        depot
            .executor
            .execute(actor, &id, TransitionRequest::new(from, to))
            .await
            .unwrap();
    }

    let request = depot.store.get(&id).await.unwrap();
    assert_eq!(request.status, State::InYard);
    assert_eq!(request.history.len(), 11);
    assert_eq!(request.history[0].from, Some(State::Pending));
    for pair in request.history.windows(2) {
        assert_eq!(pair[1].from, pair[0].resulting_state());
    }
    assert_eq!(request.history.last().unwrap().resulting_state(), Some(request.status));
    assert_eq!(request.history[2].by, "system");
}
