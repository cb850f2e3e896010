//! Wire records shared by the HTTP gateway, the serverless adapters and the
//! smoke-test client.

mod errors;

pub use errors::SchemaError;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in original image pixel space (left, top, right, bottom).
///
/// No ordering between corners is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One recognized object from a single inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Result of one prediction.
///
/// `num_detections` is derived from `detections` and cannot be set on its own.
/// Deserializing a payload where the two disagree is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PredictResponseWire")]
pub struct PredictResponse {
    model: String,
    num_detections: usize,
    detections: Vec<Detection>,
}

impl PredictResponse {
    pub fn new(model: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            model: model.into(),
            num_detections: detections.len(),
            detections,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn num_detections(&self) -> usize {
        self.num_detections
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

#[derive(Deserialize)]
struct PredictResponseWire {
    model: String,
    num_detections: usize,
    detections: Vec<Detection>,
}

impl TryFrom<PredictResponseWire> for PredictResponse {
    type Error = SchemaError;

    fn try_from(wire: PredictResponseWire) -> Result<Self, Self::Error> {
        if wire.num_detections != wire.detections.len() {
            return Err(SchemaError::CountMismatch {
                declared: wire.num_detections,
                actual: wire.detections.len(),
            });
        }
        Ok(Self::new(wire.model, wire.detections))
    }
}

/// Liveness record. `device` serializes as `null` when the runtime picks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: Option<String>,
}

impl HealthResponse {
    pub fn ok(model: impl Into<String>, device: Option<String>) -> Self {
        Self {
            status: "ok".to_string(),
            model: model.into(),
            device,
        }
    }
}
