use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

pub(crate) type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
/// Use [`crate::TelemetryGuard::init`] instead when spans should also be exported.
pub fn setup_logging(environment: Environment) -> anyhow::Result<()> {
    init_subscriber(None, environment)
}

pub(crate) fn init_subscriber(
    otel_layer: Option<BoxedLayer>,
    environment: Environment,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .try_init()?;
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .try_init()?;
        }
    }

    Ok(())
}
