use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured JSON logging for the worker process.
pub fn init_telemetry() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    tracing::info!("atelier telemetry initialized with structured logging");
    Ok(())
}

/// Generate a correlation ID for linking the steps of one worker cycle.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one worker-cycle's epic/changeset coordination.
pub fn create_coordination_span(
    operation: &str,
    agent_id: Option<&str>,
    changeset_id: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "worker_cycle",
        operation = operation,
        agent.id = agent_id,
        changeset.id = changeset_id,
        correlation.id = correlation_id,
    )
}

pub fn shutdown_telemetry() {
    tracing::info!("atelier telemetry shutdown complete");
}
