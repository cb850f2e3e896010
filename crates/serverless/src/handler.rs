use crate::fetch::ImageFetcher;
use crate::outcome::Outcome;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use inference::{DetectionService, Detector, decode_rgb};
use schema::{HealthResponse, PredictResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_METHOD: &str = "predict";

/// Payload of a successful handler call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HandlerData {
    Health(HealthResponse),
    Predict(PredictResponse),
}

#[derive(Debug, Default, Deserialize)]
struct Event {
    #[serde(default)]
    input: Option<EventInput>,
}

#[derive(Debug, Default, Deserialize)]
struct EventInput {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

enum ImageSource {
    Base64(String),
    Url(String),
}

impl EventInput {
    fn method(&self) -> &str {
        self.method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_METHOD)
    }

    /// Base64 wins when both are given; empty strings count as absent.
    fn image_source(self) -> Option<ImageSource> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        present(self.image_base64)
            .map(ImageSource::Base64)
            .or_else(|| present(self.image_url).map(ImageSource::Url))
    }
}

/// Request/response handler for serverless events of the form
/// `{"input": {"method": ..., "image_base64": ..., "image_url": ...}}`.
pub struct EventHandler<D: Detector> {
    service: Arc<DetectionService<D>>,
    fetcher: ImageFetcher,
}

impl<D: Detector> EventHandler<D> {
    pub fn new(service: Arc<DetectionService<D>>, fetcher: ImageFetcher) -> Self {
        Self { service, fetcher }
    }

    /// Answer one event. Never fails; problems become [`Outcome::Error`].
    pub async fn handle(&self, event: Value) -> Outcome<HandlerData> {
        let event: Event = match serde_json::from_value(event) {
            Ok(event) => event,
            Err(e) => return Outcome::error(format!("Handler error: {e}")),
        };
        let input = event.input.unwrap_or_default();

        match input.method() {
            "health" => Outcome::success(HandlerData::Health(self.service.health())),
            "predict" => match self.predict(input).await {
                Ok(response) => Outcome::success(HandlerData::Predict(response)),
                Err(message) => {
                    tracing::warn!(error = %message, "Prediction request failed");
                    Outcome::error(message)
                }
            },
            other => Outcome::error(format!(
                "Unknown method: {other}. Supported methods: 'predict', 'health'"
            )),
        }
    }

    async fn predict(&self, input: EventInput) -> Result<PredictResponse, String> {
        let source = input
            .image_source()
            .ok_or_else(|| "Either image_base64 or image_url must be provided".to_string())?;

        let (bytes, stage) = match source {
            ImageSource::Base64(encoded) => {
                let bytes = decode_base64(&encoded)
                    .map_err(|e| format!("Failed to decode base64 image: {e}"))?;
                (bytes, "Failed to decode base64 image")
            }
            ImageSource::Url(url) => {
                let bytes = self
                    .fetcher
                    .fetch(&url)
                    .await
                    .map_err(|e| format!("Failed to download image from URL: {e}"))?;
                (bytes, "Failed to download image from URL")
            }
        };

        let image = tokio::task::spawn_blocking(move || decode_rgb(&bytes))
            .await
            .map_err(|e| format!("{stage}: {e}"))?
            .map_err(|e| format!("{stage}: {e}"))?;

        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || service.predict(&image))
            .await
            .map_err(|e| format!("Failed to run prediction: {e}"))?
            .map_err(|e| format!("Failed to run prediction: {e}"))
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
