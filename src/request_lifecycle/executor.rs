//! Transition executor.
//!
//! Runs one transition end to end: validate against the graph, persist the new
//! status and history atomically (compare-and-set on the prior status), emit an
//! audit event, then post a best-effort notification to the request channel.
//! Only validation and persistence failures reach the caller; audit and
//! notification are each bounded by a timeout once the commit is durable.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::observability::{OperationTimer, TransitionMetrics};
use crate::request_lifecycle::errors::{StoreError, TransitionError};
use crate::request_lifecycle::graph::StateGraph;
use crate::request_lifecycle::notifications::status_message;
use crate::request_lifecycle::traits::{AuditSink, ChannelService, RequestStore};
use crate::request_lifecycle::types::*;
use crate::request_lifecycle::validator::TransitionValidator;
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// History label for the informational half of a container assignment
pub const CONTAINER_ASSIGNED: &str = "CONTAINER_ASSIGNED";

static CONTAINER_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{4}[0-9]{7}$").ok());

/// Runtime knobs for the executor
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub system_actor_id: String,
    pub audit_target_type: String,
    pub audit_timeout: Duration,
    pub notifications_enabled: bool,
    pub notification_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for ExecutorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            system_actor_id: config.system_actor_id.clone(),
            audit_target_type: config.audit_target_type.clone(),
            audit_timeout: Duration::from_millis(config.audit_timeout_ms),
            notifications_enabled: config.notifications_enabled,
            notification_timeout: Duration::from_millis(config.notification_timeout_ms),
        }
    }
}

/// What happened to the channel message after the transition committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Failed(String),
    /// Notifications disabled, or the transition was a replay
    Skipped,
}

/// Result of a committed transition
#[derive(Debug, Clone)]
pub struct TransitionReceipt {
    /// Request as stored by the commit
    pub request: Request,
    pub from: State,
    pub to: State,
    pub rule_description: &'static str,
    /// The history entry recording the transition
    pub entry: HistoryEntry,
    pub audit_recorded: bool,
    pub notification: NotificationOutcome,
    /// True when an earlier attempt with the same idempotency key had already committed
    pub replayed: bool,
    /// Correlation id attached to this call's span and audit event
    pub correlation_id: String,
}

struct PreparedTransition {
    from: State,
    to: State,
    reason: Option<String>,
    description: &'static str,
    /// Informational entry written just before the transition entry
    note: Option<HistoryEntry>,
    entry: HistoryEntry,
    patch: RequestPatch,
    idempotency_key: Option<String>,
    correlation_id: String,
}

pub struct TransitionExecutor {
    validator: TransitionValidator,
    store: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditSink>,
    channels: Arc<dyn ChannelService>,
    metrics: Arc<TransitionMetrics>,
    settings: ExecutorSettings,
}

impl TransitionExecutor {
    pub fn new(
        graph: Arc<StateGraph>,
        store: Arc<dyn RequestStore>,
        audit: Arc<dyn AuditSink>,
        channels: Arc<dyn ChannelService>,
    ) -> Self {
        Self {
            validator: TransitionValidator::new(graph),
            store,
            audit,
            channels,
            metrics: Arc::new(TransitionMetrics::new()),
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TransitionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn graph(&self) -> &StateGraph {
        self.validator.graph()
    }

    pub fn validator(&self) -> &TransitionValidator {
        &self.validator
    }

    pub fn metrics(&self) -> &Arc<TransitionMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Actor recorded for automated steps such as gate dispatch
    pub fn system_actor(&self) -> Actor {
        Actor::new(self.settings.system_actor_id.clone(), Role::SystemAdmin)
    }

    /// Move `request_id` from `transition.from` to `transition.to` on behalf of `actor`
    pub async fn execute(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        transition: TransitionRequest,
    ) -> Result<TransitionReceipt, TransitionError> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            "execute",
            request_id.as_str(),
            &actor.id,
            Some(correlation_id.as_str()),
        );
        async {
            let timer = OperationTimer::new("request_transition");
            let result = self.execute_inner(actor, request_id, transition, correlation_id).await;
            timer.finish();
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_inner(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        transition: TransitionRequest,
        correlation_id: String,
    ) -> Result<TransitionReceipt, TransitionError> {
        let TransitionRequest {
            from,
            to,
            reason,
            extra,
            idempotency_key,
        } = transition;

        let description = self.check(actor, request_id, from, to, reason.as_deref())?;
        let container_no = extra
            .container_no
            .as_deref()
            .map(normalize_container_number)
            .transpose()?;

        let now = Utc::now();
        let reason = non_blank(reason);
        let metadata = entry_metadata(&extra, container_no.as_deref(), idempotency_key.as_deref());

        let mut patch = side_effects(actor, to, reason.as_deref(), now);
        patch.appointment = extra.appointment;
        patch.container_no = container_no;

        let entry = HistoryEntry::transition(&actor.id, from, to, reason.clone(), metadata, now);

        self.commit_and_announce(
            actor,
            request_id,
            PreparedTransition {
                from,
                to,
                reason,
                description,
                note: None,
                entry,
                patch,
                idempotency_key,
                correlation_id,
            },
        )
        .await
    }

    /// Assign a container and move the request to `PICK_CONTAINER` in one write.
    ///
    /// Appends two history entries: a `CONTAINER_ASSIGNED` note followed by the
    /// transition itself.
    pub async fn assign_container(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        from: State,
        container_no: &str,
    ) -> Result<TransitionReceipt, TransitionError> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            "assign_container",
            request_id.as_str(),
            &actor.id,
            Some(correlation_id.as_str()),
        );
        async {
            let to = State::PickContainer;
            let description = self.check(actor, request_id, from, to, None)?;
            let container_no = normalize_container_number(container_no)?;

            let now = Utc::now();
            let metadata = Some(json!({ "container_no": container_no }));
            let note = HistoryEntry::informational(&actor.id, CONTAINER_ASSIGNED, metadata.clone(), now);
            let entry = HistoryEntry::transition(&actor.id, from, to, None, metadata, now);
            let patch = RequestPatch {
                container_no: Some(container_no),
                ..Default::default()
            };

            self.commit_and_announce(
                actor,
                request_id,
                PreparedTransition {
                    from,
                    to,
                    reason: None,
                    description,
                    note: Some(note),
                    entry,
                    patch,
                    idempotency_key: None,
                    correlation_id,
                },
            )
            .await
        }
        .instrument(span)
        .await
    }

    fn check(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        from: State,
        to: State,
        reason: Option<&str>,
    ) -> Result<&'static str, TransitionError> {
        match self.validator.validate(actor.role, from, to, reason) {
            Ok(rule) => Ok(rule.description),
            Err(e) => {
                self.metrics.record_rejected();
                warn!(
                    request_id = %request_id,
                    from = %from,
                    to = %to,
                    role = %actor.role,
                    error = %e,
                    "Transition rejected"
                );
                Err(e)
            }
        }
    }

    async fn commit_and_announce(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        mut prepared: PreparedTransition,
    ) -> Result<TransitionReceipt, TransitionError> {
        let (from, to) = (prepared.from, prepared.to);
        let update = StatusUpdate {
            expected_status: from,
            new_status: to,
            entries: prepared
                .note
                .take()
                .into_iter()
                .chain(Some(prepared.entry.clone()))
                .collect(),
            patch: std::mem::take(&mut prepared.patch),
        };

        let request = match self.store.update_status_and_append_history(request_id, update).await {
            Ok(request) => request,
            Err(StoreError::Conflict { .. }) if prepared.idempotency_key.is_some() => {
                return self.replay_or_conflict(actor, request_id, &prepared).await;
            }
            Err(e) => {
                let err = TransitionError::from(e);
                if err.is_retryable() {
                    self.metrics.record_conflict();
                    warn!(request_id = %request_id, from = %from, to = %to, error = %err, "Transition lost a concurrent update");
                } else if err.is_indeterminate() {
                    error!(
                        request_id = %request_id,
                        from = %from,
                        to = %to,
                        error = %err,
                        "Store failed mid-write; transition may or may not be committed"
                    );
                } else {
                    error!(request_id = %request_id, from = %from, to = %to, error = %err, "Failed to persist transition");
                }
                return Err(err);
            }
        };

        self.metrics.record_committed();
        info!(
            request_id = %request_id,
            from = %from,
            to = %to,
            role = %actor.role,
            actor_id = %actor.id,
            "Request transition committed"
        );

        let audit_recorded = self
            .emit_audit(actor, request_id, to, &prepared.entry, &prepared.correlation_id, false)
            .await;
        let notification = self.notify(request_id, to, prepared.reason.as_deref()).await;

        Ok(TransitionReceipt {
            request,
            from,
            to,
            rule_description: prepared.description,
            entry: prepared.entry,
            audit_recorded,
            notification,
            replayed: false,
            correlation_id: prepared.correlation_id,
        })
    }

    /// After a conflict, decide whether an earlier attempt with the same key already committed.
    ///
    /// A replay re-emits the audit event (flagged `replayed`) because the earlier
    /// attempt may have failed before auditing; consumers dedupe on the
    /// idempotency key carried in the payload. The channel is not notified again.
    async fn replay_or_conflict(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        prepared: &PreparedTransition,
    ) -> Result<TransitionReceipt, TransitionError> {
        let (from, to) = (prepared.from, prepared.to);
        let request = self.store.get(request_id).await?;
        let previous = request
            .last_transition()
            .filter(|entry| entry.idempotency_key() == prepared.idempotency_key.as_deref())
            .filter(|entry| entry.from == Some(from) && entry.resulting_state() == Some(to))
            .cloned();

        let Some(entry) = previous else {
            self.metrics.record_conflict();
            warn!(request_id = %request_id, from = %from, to = %to, actual = %request.status, "Transition lost a concurrent update");
            return Err(StoreError::Conflict {
                request_id: request_id.clone(),
                expected: from,
                actual: request.status,
            }
            .into());
        };

        self.metrics.record_replayed();
        info!(request_id = %request_id, from = %from, to = %to, "Transition already applied with this idempotency key");
        let audit_recorded = self
            .emit_audit(actor, request_id, to, &entry, &prepared.correlation_id, true)
            .await;

        Ok(TransitionReceipt {
            request,
            from,
            to,
            rule_description: prepared.description,
            entry,
            audit_recorded,
            notification: NotificationOutcome::Skipped,
            replayed: true,
            correlation_id: prepared.correlation_id.clone(),
        })
    }

    async fn emit_audit(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        to: State,
        entry: &HistoryEntry,
        correlation_id: &str,
        replayed: bool,
    ) -> bool {
        let event = AuditEvent {
            actor_id: Some(actor.id.clone()),
            event_name: format!("REQUEST.{to}"),
            target_type: self.settings.audit_target_type.clone(),
            target_id: Some(request_id.to_string()),
            payload: audit_payload(entry, to, correlation_id, replayed),
            at: Utc::now(),
        };

        let recorded = tokio::time::timeout(self.settings.audit_timeout, self.audit.record(event));
        let outcome = match recorded.await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.settings.audit_timeout.as_millis()),
        };

        self.metrics.record_audit_failure();
        error!(request_id = %request_id, to = %to, error = %outcome, "Failed to record audit event; transition stays committed");
        false
    }

    async fn notify(&self, request_id: &RequestId, to: State, reason: Option<&str>) -> NotificationOutcome {
        if !self.settings.notifications_enabled {
            debug!(request_id = %request_id, "Channel notifications disabled");
            return NotificationOutcome::Skipped;
        }

        let text = status_message(to, reason);
        let delivery = async {
            let channel = self.channels.get_or_create_channel(request_id).await?;
            self.channels.post_system_message(&channel, &text).await
        };

        let outcome = match tokio::time::timeout(self.settings.notification_timeout, delivery).await {
            Ok(Ok(())) => NotificationOutcome::Delivered,
            Ok(Err(e)) => NotificationOutcome::Failed(e.to_string()),
            Err(_) => NotificationOutcome::Failed(format!(
                "timed out after {}ms",
                self.settings.notification_timeout.as_millis()
            )),
        };

        if let NotificationOutcome::Failed(message) = &outcome {
            self.metrics.record_notification_failure();
            warn!(request_id = %request_id, to = %to, error = %message, "Channel notification failed; transition stays committed");
        }
        outcome
    }
}

/// Uppercases and checks an ISO 6346 style container number (4 letters, 7 digits)
pub fn normalize_container_number(raw: &str) -> Result<String, TransitionError> {
    let candidate = raw.trim().to_ascii_uppercase();
    if CONTAINER_NUMBER
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(&candidate))
    {
        Ok(candidate)
    } else {
        Err(TransitionError::InvalidContainerNumber(raw.to_string()))
    }
}

fn non_blank(reason: Option<String>) -> Option<String> {
    reason.filter(|r| !r.trim().is_empty())
}

/// Domain fields implied by the target state
fn side_effects(actor: &Actor, to: State, reason: Option<&str>, now: DateTime<Utc>) -> RequestPatch {
    let mut patch = RequestPatch::default();
    match to {
        State::Rejected => {
            patch.rejection = Some(Rejection {
                reason: reason.unwrap_or_default().to_string(),
                by: actor.id.clone(),
                at: now,
            });
        }
        State::Forwarded => patch.forwarded_at = Some(now),
        _ => {}
    }
    patch
}

fn entry_metadata(
    extra: &TransitionExtra,
    container_no: Option<&str>,
    idempotency_key: Option<&str>,
) -> Option<Value> {
    let mut metadata = extra.metadata.clone();
    if let Some(appointment) = &extra.appointment {
        metadata.insert("appointment".to_string(), json!(appointment));
    }
    if let Some(container_no) = container_no {
        metadata.insert("container_no".to_string(), json!(container_no));
    }
    if let Some(key) = idempotency_key {
        metadata.insert(IDEMPOTENCY_KEY_FIELD.to_string(), json!(key));
    }
    (!metadata.is_empty()).then_some(Value::Object(metadata))
}

/// Entry metadata with the core keys written last so callers cannot shadow them
fn audit_payload(entry: &HistoryEntry, to: State, correlation_id: &str, replayed: bool) -> Value {
    let mut payload = match &entry.metadata {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    payload.insert("from".to_string(), json!(entry.from));
    payload.insert("to".to_string(), json!(to));
    payload.insert("reason".to_string(), json!(entry.reason));
    payload.insert("correlation_id".to_string(), json!(correlation_id));
    if replayed {
        payload.insert("replayed".to_string(), json!(true));
    }
    Value::Object(payload)
}
