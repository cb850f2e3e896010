use common::{TelemetryGuard, setup_logging};
use gateway::{AppState, GatewayConfig, create_app};
use inference::{DetectionService, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("gateway", endpoint, config.environment)?),
        None => {
            setup_logging(config.environment);
            None
        }
    };

    let settings = Settings::from_env()?;

    tracing::info!(
        config = ?config,
        settings = ?settings,
        "Loaded configuration"
    );

    let service = DetectionService::load(settings)?;
    tracing::info!(model = %service.model_name(), "Model loaded successfully");

    let app = create_app(AppState::new(service), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
