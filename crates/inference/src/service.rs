use crate::{
    backend::{ClassNames, DetectParams, Detector, DetectorOutput},
    config::Settings,
    errors::InferenceError,
};
use image::RgbImage;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use schema::{BBox, Detection, HealthResponse, PredictResponse};
use std::time::Instant;

struct ServiceMetrics {
    duration_histogram: Histogram<f64>,
    requests_counter: Counter<u64>,
    detections_counter: Counter<u64>,
}

impl ServiceMetrics {
    fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];
        let duration_histogram = meter
            .f64_histogram("detection_inference_duration_seconds")
            .with_description("Time to run detection on one image (preprocess + infer + NMS)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests_counter = meter
            .u64_counter("detection_requests_total")
            .with_description("Total images submitted for detection")
            .build();
        let detections_counter = meter
            .u64_counter("detection_objects_total")
            .with_description("Total objects detected")
            .build();

        Self {
            duration_histogram,
            requests_counter,
            detections_counter,
        }
    }
}

/// Owns the single loaded model and turns its raw boxes into [`Detection`]s.
///
/// Build one per process and share it behind an `Arc`.
pub struct DetectionService<D: Detector> {
    detector: D,
    settings: Settings,
    params: DetectParams,
    metrics: ServiceMetrics,
}

#[cfg(feature = "ort-backend")]
impl DetectionService<crate::backend::ort::OrtDetector> {
    /// Load the ONNX model named by `settings`. Failure here is fatal and not retried.
    pub fn load(settings: Settings) -> Result<Self, InferenceError> {
        tracing::info!(
            model = %settings.model_name,
            path = %settings.model_path.display(),
            "Loading detection model"
        );
        let detector =
            crate::backend::ort::OrtDetector::load(&settings.model_path, &settings.device)?;
        Ok(Self::new(detector, settings))
    }
}

impl<D: Detector> DetectionService<D> {
    pub fn new(detector: D, settings: Settings) -> Self {
        let params = DetectParams::from(&settings);
        Self {
            detector,
            settings,
            params,
            metrics: ServiceMetrics::init("detection"),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse::ok(
            self.settings.model_name.clone(),
            self.settings.device.as_hint().map(str::to_string),
        )
    }

    /// Run the detector on `image` and map every box it emits, in emission order.
    pub fn predict_image(&self, image: &RgbImage) -> Result<Vec<Detection>, InferenceError> {
        let span = tracing::info_span!(
            "predict_image",
            width = image.width(),
            height = image.height()
        );
        let _enter = span.enter();

        let start = Instant::now();
        self.metrics.requests_counter.add(1, &[]);

        let output = self
            .detector
            .detect(image, &self.params)
            .map_err(InferenceError::inference)?;

        let detections = to_detections(output);

        let elapsed = start.elapsed().as_secs_f64();
        let attributes = [KeyValue::new("model", self.settings.model_name.clone())];
        self.metrics.duration_histogram.record(elapsed, &attributes);
        self.metrics
            .detections_counter
            .add(detections.len() as u64, &attributes);

        tracing::debug!(
            detections = detections.len(),
            elapsed_ms = elapsed * 1000.0,
            "Detection complete"
        );

        Ok(detections)
    }

    pub fn predict(&self, image: &RgbImage) -> Result<PredictResponse, InferenceError> {
        let detections = self.predict_image(image)?;
        Ok(PredictResponse::new(self.model_name(), detections))
    }
}

fn to_detections(output: Option<DetectorOutput>) -> Vec<Detection> {
    let Some(DetectorOutput {
        boxes: Some(boxes),
        names,
    }) = output
    else {
        return Vec::new();
    };

    boxes
        .into_iter()
        .map(|row| Detection {
            class_id: row.class_id,
            class_name: resolve_class_name(names.as_deref(), row.class_id),
            confidence: row.confidence,
            bbox: BBox::new(row.x1, row.y1, row.x2, row.y2),
        })
        .collect()
}

/// Label for `class_id`, or the id itself when the table is missing or has no entry.
pub fn resolve_class_name(names: Option<&ClassNames>, class_id: u32) -> String {
    names
        .and_then(|names| names.get(&class_id))
        .cloned()
        .unwrap_or_else(|| class_id.to_string())
}
