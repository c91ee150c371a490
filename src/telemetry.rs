use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::entity::EntityType;

/// Initialize structured logging on stderr.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_telemetry(settings: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::info!("billing-bridge telemetry initialized");
    Ok(())
}

/// Generate a correlation ID; also used as the run identifier.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one run's pipeline and completion sweep.
pub fn create_run_span(operation: &str, run_id: &str, entity_type: EntityType) -> tracing::Span {
    tracing::info_span!(
        "migration_run",
        operation = operation,
        run.id = run_id,
        entity.kind = entity_type.as_str(),
        otel.kind = "internal"
    )
}

pub fn shutdown_telemetry() {
    tracing::info!("billing-bridge telemetry shutdown complete");
}
