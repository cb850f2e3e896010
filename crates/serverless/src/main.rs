use clap::{Parser, Subcommand};
use common::{TelemetryGuard, setup_logging};
use inference::{DetectionService, Settings};
use serverless::{DetectorWorker, EventHandler, ImageFetcher, ServerlessConfig, http};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "serverless", about = "Serverless hosts for the object detection service")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Mode {
    /// Serve request/response events on POST /runsync
    Handler,
    /// Serve a long-lived worker on POST /predict and GET /health
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerlessConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "serverless",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(config.environment);
            None
        }
    };

    let settings = Settings::from_env()?;
    tracing::info!(mode = ?cli.mode, config = ?config, settings = ?settings, "Loaded configuration");

    // Loaded once per process and reused across requests.
    let service = Arc::new(DetectionService::load(settings)?);
    tracing::info!(model = %service.model_name(), "Model loaded successfully");

    let app = match cli.mode {
        Mode::Handler => {
            let fetcher = ImageFetcher::new(config.fetch_timeout, config.fetch_max_bytes)?;
            http::handler_router(Arc::new(EventHandler::new(service, fetcher)))
        }
        Mode::Worker => http::worker_router(Arc::new(DetectorWorker::new(service))),
    };

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, mode = ?cli.mode, "Serverless host listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Serverless host stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
