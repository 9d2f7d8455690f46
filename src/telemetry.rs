use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Install the global subscriber: env filter plus JSON or plain fmt output.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
    }

    tracing::info!("Workforce panel telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping everything one task view does.
pub fn create_view_span(task_id: Uuid, employee_id: Uuid, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "task_view",
        task.id = %task_id,
        employee.id = %employee_id,
        correlation.id = correlation_id,
    )
}

/// Span for one coordinator refetch round.
pub fn create_sync_span(employee_id: Uuid, trigger: &str) -> tracing::Span {
    tracing::debug_span!("live_sync", employee.id = %employee_id, trigger = trigger)
}

pub fn shutdown_telemetry() {
    tracing::info!("Workforce panel telemetry shutdown complete");
}
