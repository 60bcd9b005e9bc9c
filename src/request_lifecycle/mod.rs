// Request Lifecycle Module - Depot request state machine
//
// The transition graph, its validator, the executor that commits transitions
// and the upload-driven auto-transitions. Collaborators are injected through
// the traits in `traits` so every piece can be tested in isolation.

pub mod types;
pub mod errors;
pub mod graph;
pub mod validator;
pub mod traits;
pub mod notifications;
pub mod executor;
pub mod auto_trigger;
pub mod memory;

pub use auto_trigger::{AutoTransitionOutcome, AutoTransitionTrigger, DocumentKind, TriggerReasons};
pub use errors::{AuditError, ChannelError, StoreError, TransitionError};
pub use executor::{ExecutorSettings, NotificationOutcome, TransitionExecutor, TransitionReceipt};
pub use graph::{StateGraph, TransitionRule};
pub use traits::{AuditSink, ChannelService, RequestStore};
pub use types::{
    Actor, Appointment, AuditEvent, ChannelHandle, HistoryEntry, Request, RequestId, RequestPatch,
    RequestType, Role, State, StatusUpdate, TransitionExtra, TransitionRequest,
};
pub use validator::TransitionValidator;
