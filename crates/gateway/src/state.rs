use inference::{DetectionService, Detector};
use std::sync::Arc;

/// Shared router state: the one detection service of this process.
pub struct AppState<D: Detector> {
    pub service: Arc<DetectionService<D>>,
}

impl<D: Detector> AppState<D> {
    pub fn new(service: DetectionService<D>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl<D: Detector> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
