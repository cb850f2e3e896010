use schema::{HealthResponse, PredictResponse};
use std::fmt::Write;

pub const TOP_DETECTIONS: usize = 3;

pub fn describe_health(health: &HealthResponse) -> String {
    format!(
        "Health: {} (model {}, device {})",
        health.status,
        health.model,
        health.device.as_deref().unwrap_or("auto")
    )
}

/// Model, count and the first `top` detections, one per line.
pub fn describe_prediction(response: &PredictResponse, top: usize) -> String {
    let mut out = format!(
        "Model: {}\nDetections: {}",
        response.model(),
        response.num_detections()
    );
    let shown = &response.detections()[..response.detections().len().min(top)];
    if !shown.is_empty() {
        let _ = write!(out, "\nFirst {} detections:", shown.len());
        for det in shown {
            let _ = write!(out, "\n  - {}: {:.2}", det.class_name, det.confidence);
        }
    }
    out
}
