use crate::outcome::Outcome;
use inference::{DetectionService, Detector, decode_rgb};
use schema::{HealthResponse, PredictResponse};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Long-lived worker holding one loaded model for its whole life.
pub struct DetectorWorker<D: Detector> {
    service: Arc<DetectionService<D>>,
}

impl<D: Detector> DetectorWorker<D> {
    pub fn new(service: Arc<DetectionService<D>>) -> Self {
        Self { service }
    }

    /// Detect objects in encoded image bytes. Panics in the detector are
    /// reported as errors, and the worker stays usable afterwards.
    pub fn predict(&self, image_bytes: &[u8]) -> Outcome<PredictResponse> {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let image = decode_rgb(image_bytes)?;
            self.service.predict(&image)
        }));

        match result {
            Ok(outcome) => {
                if let Err(e) = &outcome {
                    tracing::warn!(error = %e, "Worker prediction failed");
                }
                outcome.into()
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(error = %message, "Detector panicked");
                Outcome::error(message)
            }
        }
    }

    pub fn health(&self) -> HealthResponse {
        self.service.health()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "detector panicked".to_string()
    }
}
