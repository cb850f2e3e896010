//! Local HTTP hosting for the two serverless adapters.

use crate::handler::{EventHandler, HandlerData};
use crate::outcome::Outcome;
use crate::worker::DetectorWorker;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use inference::Detector;
use schema::{HealthResponse, PredictResponse};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Envelope returned by `/runsync`.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub output: Outcome<HandlerData>,
}

/// `POST /runsync` accepting a handler event as the JSON body.
pub fn handler_router<D: Detector>(handler: Arc<EventHandler<D>>) -> Router {
    Router::new()
        .route("/runsync", post(run_sync::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// `POST /predict` with raw image bytes as the body, plus `GET /health`.
pub fn worker_router<D: Detector>(worker: Arc<DetectorWorker<D>>) -> Router {
    Router::new()
        .route("/predict", post(worker_predict::<D>))
        .route("/health", get(worker_health::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(worker)
}

async fn run_sync<D: Detector>(
    State(handler): State<Arc<EventHandler<D>>>,
    body: Bytes,
) -> Json<RunResponse> {
    let output = match serde_json::from_slice::<Value>(&body) {
        Ok(event) => handler.handle(event).await,
        Err(e) => Outcome::error(format!("Handler error: {e}")),
    };
    Json(RunResponse { output })
}

async fn worker_predict<D: Detector>(
    State(worker): State<Arc<DetectorWorker<D>>>,
    body: Bytes,
) -> Json<Outcome<PredictResponse>> {
    let outcome = tokio::task::spawn_blocking(move || worker.predict(&body))
        .await
        .unwrap_or_else(|e| Outcome::error(e.to_string()));
    Json(outcome)
}

async fn worker_health<D: Detector>(
    State(worker): State<Arc<DetectorWorker<D>>>,
) -> Json<HealthResponse> {
    Json(worker.health())
}
