use common::{TelemetryGuard, setup_logging};
use gateway::{AppState, GatewayConfig, router};
use inference::{Model, ModelArtifacts};

#[cfg(feature = "ort-backend")]
use inference::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The gateway needs an inference backend: enable the 'ort-backend' feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("gateway", endpoint, config.environment)?),
        None => {
            setup_logging(config.environment)?;
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let artifacts = ModelArtifacts::load(&config.model_paths)?;
    let model = Model::<Backend>::load(artifacts, &config.backend)?;
    tracing::info!(
        input_size = ?model.input_size(),
        output_dim = ?model.descriptor().output_dim(),
        "Model ready"
    );

    let app = router(AppState::new(model), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening for prediction requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
