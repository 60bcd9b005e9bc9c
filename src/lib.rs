// Depot Lifecycle Library - Request state machine orchestration
// This exposes the core components for testing and integration

pub mod config;
pub mod observability;
pub mod request_lifecycle;
pub mod telemetry;

#[cfg(feature = "database")]
pub mod database;

// Re-export key types for easy access
pub use config::{DatabaseConfig, DepotConfig, ObservabilityConfig, OrchestratorConfig};
pub use observability::{OperationTimer, TransitionMetrics, TransitionStats};
pub use request_lifecycle::{
    Actor, AutoTransitionOutcome, AutoTransitionTrigger, DocumentKind, NotificationOutcome,
    Request, RequestId, RequestType, Role, State, StateGraph, TransitionError, TransitionExecutor,
    TransitionReceipt, TransitionRequest, TransitionRule, TransitionValidator,
};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};

#[cfg(feature = "database")]
pub use database::SqliteRequestStore;
