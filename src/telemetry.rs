use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured level when set. Both
/// formats write to stderr; stdout carries command output only.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!("Depot lifecycle telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common request transition attributes
pub fn create_transition_span(
    operation: &str,
    request_id: &str,
    actor_id: &str,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "request_transition",
        operation = operation,
        request.id = request_id,
        actor.id = actor_id,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
