use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
};
use inference::{Detector, decode_rgb};
use schema::{HealthResponse, PredictResponse};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const FILE_FIELD: &str = "file";

/// Build the HTTP app: `/` plus `/api/health` and `/api/predict`.
pub fn create_app<D: Detector>(state: AppState<D>, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/health", get(health::<D>))
        .route("/predict", post(predict::<D>));

    Router::new()
        .route("/", get(root))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome, YOLOv8 model serving is running",
        "health": "/api/health",
    }))
}

async fn health<D: Detector>(State(state): State<AppState<D>>) -> Json<HealthResponse> {
    Json(state.service.health())
}

async fn predict<D: Detector>(
    State(state): State<AppState<D>>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let bytes = read_file_field(multipart).await?;
    tracing::debug!(bytes = bytes.len(), "Received image upload");

    // Decoding and inference are CPU-bound; keep them off the async workers.
    let service = Arc::clone(&state.service);
    let response = tokio::task::spawn_blocking(move || {
        let image = decode_rgb(&bytes)?;
        service.predict(&image)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(response))
}

async fn read_file_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(ApiError::MissingField(FILE_FIELD))
}
