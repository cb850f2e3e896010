pub mod backend;
pub mod config;
pub mod errors;
pub mod postprocessing;
pub mod preprocessing;
pub mod service;

// Re-export commonly used types for convenience
pub use backend::{
    ClassNames, DetectParams, Detector, DetectorOutput, RawDetection, lock_unpoisoned,
};
pub use config::{Device, Settings};
pub use errors::InferenceError;
pub use preprocessing::decode_rgb;
pub use service::DetectionService;

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtDetector;
