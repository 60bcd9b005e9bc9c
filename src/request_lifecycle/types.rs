// Core types for the request lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::request_lifecycle::errors::TransitionError;

/// Business states a depot request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Created by the customer, awaiting depot review
    Pending,
    /// Depot assigned an empty container to an export request
    PickContainer,
    /// Appointment scheduled
    Scheduled,
    /// Customer added appointment details
    ScheduledInfoAdded,
    /// Supplement documents received, forwarded to the depot
    Forwarded,
    /// Released to the gate
    SentToGate,
    /// Truck checked in at the gate
    GateIn,
    /// Container under inspection
    Checking,
    /// Inspection finished
    Checked,
    /// Waiting for the customer to accept the inspection result
    PendingAccept,
    /// Customer accepted the inspection result
    Accept,
    /// Yard slot assigned
    Positioned,
    /// Forklift move in progress
    Forklifting,
    /// Stored in the yard
    InYard,
    Rejected,
    Completed,
}

impl State {
    pub const ALL: [State; 16] = [
        State::Pending,
        State::PickContainer,
        State::Scheduled,
        State::ScheduledInfoAdded,
        State::Forwarded,
        State::SentToGate,
        State::GateIn,
        State::Checking,
        State::Checked,
        State::PendingAccept,
        State::Accept,
        State::Positioned,
        State::Forklifting,
        State::InYard,
        State::Rejected,
        State::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "PENDING",
            State::PickContainer => "PICK_CONTAINER",
            State::Scheduled => "SCHEDULED",
            State::ScheduledInfoAdded => "SCHEDULED_INFO_ADDED",
            State::Forwarded => "FORWARDED",
            State::SentToGate => "SENT_TO_GATE",
            State::GateIn => "GATE_IN",
            State::Checking => "CHECKING",
            State::Checked => "CHECKED",
            State::PendingAccept => "PENDING_ACCEPT",
            State::Accept => "ACCEPT",
            State::Positioned => "POSITIONED",
            State::Forklifting => "FORKLIFTING",
            State::InYard => "IN_YARD",
            State::Rejected => "REJECTED",
            State::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| TransitionError::InvalidState(s.to_string()))
    }
}

/// Actor roles recognised by the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    SystemAdmin,
    SaleAdmin,
    CustomerAdmin,
    CustomerUser,
    /// Gate staff
    Security,
    YardManager,
    MaintenanceManager,
    Driver,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::SystemAdmin,
        Role::SaleAdmin,
        Role::CustomerAdmin,
        Role::CustomerUser,
        Role::Security,
        Role::YardManager,
        Role::MaintenanceManager,
        Role::Driver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "SystemAdmin",
            Role::SaleAdmin => "SaleAdmin",
            Role::CustomerAdmin => "CustomerAdmin",
            Role::CustomerUser => "CustomerUser",
            Role::Security => "Security",
            Role::YardManager => "YardManager",
            Role::MaintenanceManager => "MaintenanceManager",
            Role::Driver => "Driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| TransitionError::InvalidRole(s.to_string()))
    }
}

/// The user attempting a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Opaque request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Import,
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

/// One line of a request's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub by: String,
    /// Resulting state name, or a custom label for informational entries
    pub action: String,
    /// Status before the transition; `None` for informational entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl HistoryEntry {
    pub fn transition(
        by: &str,
        from: State,
        to: State,
        reason: Option<String>,
        metadata: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            at,
            by: by.to_string(),
            action: to.as_str().to_string(),
            from: Some(from),
            reason,
            metadata,
        }
    }

    pub fn informational(
        by: &str,
        label: &str,
        metadata: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            at,
            by: by.to_string(),
            action: label.to_string(),
            from: None,
            reason: None,
            metadata,
        }
    }

    /// Resulting state, when this entry records a transition
    pub fn resulting_state(&self) -> Option<State> {
        self.from?;
        self.action.parse().ok()
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(IDEMPOTENCY_KEY_FIELD)?
            .as_str()
    }
}

pub const IDEMPOTENCY_KEY_FIELD: &str = "idempotency_key";

/// A depot service request as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: State,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_at: Option<DateTime<Utc>>,
}

impl Request {
    /// New request in the initial state, as the CRUD layer creates it
    pub fn new(id: RequestId, request_type: RequestType) -> Self {
        Self {
            id,
            request_type,
            status: State::Pending,
            history: Vec::new(),
            container_no: None,
            appointment: None,
            rejection: None,
            forwarded_at: None,
        }
    }

    /// Most recent entry that records a transition (skips informational entries)
    pub fn last_transition(&self) -> Option<&HistoryEntry> {
        self.history.iter().rev().find(|entry| entry.from.is_some())
    }

    /// Applies a domain patch in place
    pub fn apply_patch(&mut self, patch: &RequestPatch) {
        if let Some(container_no) = &patch.container_no {
            self.container_no = Some(container_no.clone());
        }
        if let Some(appointment) = &patch.appointment {
            self.appointment = Some(appointment.clone());
        }
        if let Some(rejection) = &patch.rejection {
            self.rejection = Some(rejection.clone());
        }
        if let Some(forwarded_at) = patch.forwarded_at {
            self.forwarded_at = Some(forwarded_at);
        }
    }
}

/// Domain fields written atomically with a status change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPatch {
    pub container_no: Option<String>,
    pub appointment: Option<Appointment>,
    pub rejection: Option<Rejection>,
    pub forwarded_at: Option<DateTime<Utc>>,
}

/// Compare-and-set write handed to the request store
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub expected_status: State,
    pub new_status: State,
    pub entries: Vec<HistoryEntry>,
    pub patch: RequestPatch,
}

/// Optional payload carried by a transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionExtra {
    /// Structured metadata copied into the history entry and audit payload
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub appointment: Option<Appointment>,
    pub container_no: Option<String>,
}

/// A caller's request to move a request between two states
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub from: State,
    pub to: State,
    pub reason: Option<String>,
    pub extra: TransitionExtra,
    /// Lets a caller retry after an indeterminate outcome without double-applying
    pub idempotency_key: Option<String>,
}

impl TransitionRequest {
    pub fn new(from: State, to: State) -> Self {
        Self {
            from,
            to,
            reason: None,
            extra: TransitionExtra::default(),
            idempotency_key: None,
        }
    }

    /// Builds a request from raw state names, rejecting unknown states
    pub fn from_raw(from: &str, to: &str) -> Result<Self, TransitionError> {
        Ok(Self::new(from.parse()?, to.parse()?))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_appointment(mut self, appointment: Appointment) -> Self {
        self.extra.appointment = Some(appointment);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Handle to a request's collaboration channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub channel_id: String,
    pub request_id: RequestId,
}

/// Structured audit event emitted for every committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_id: Option<String>,
    pub event_name: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}
