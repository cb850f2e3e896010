use crate::config::Settings;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Class id to human-readable label, as shipped with the model.
pub type ClassNames = HashMap<u32, String>;

/// Thresholds handed to the detector on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&Settings> for DetectParams {
    fn from(settings: &Settings) -> Self {
        Self {
            conf_threshold: settings.conf_threshold,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        }
    }
}

/// One post-NMS box in original image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// What a detector returns for one image.
///
/// `boxes` is `None` when the model produced a result without box data;
/// `names` is `None` when the model carries no label table.
#[derive(Debug, Clone, Default)]
pub struct DetectorOutput {
    pub boxes: Option<Vec<RawDetection>>,
    pub names: Option<Arc<ClassNames>>,
}

/// An object detector that owns inference and suppression end to end.
///
/// Implementations are shared across request handlers, so `detect` takes
/// `&self`; backends that need exclusive access serialise internally.
pub trait Detector: Send + Sync + 'static {
    /// Run detection on an RGB image. `Ok(None)` means the model produced no result.
    fn detect(
        &self,
        image: &RgbImage,
        params: &DetectParams,
    ) -> anyhow::Result<Option<DetectorOutput>>;
}

/// Lock a detector's per-call state, recovering it if an earlier call panicked.
///
/// The guarded state must be scratch data that every call rewrites, so a
/// panic mid-call leaves nothing a later call depends on.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
