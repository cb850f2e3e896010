use crate::errors::InferenceError;
use common::{ConfigError, optional_var, parse_var};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_NAME: &str = "yolov8n.pt";
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Where inference runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Device {
    /// Let the runtime pick: CUDA when available, CPU otherwise.
    #[default]
    Auto,
    /// CPU, keeping the configured spelling for health reports.
    Cpu(String),
    Named(String),
}

impl Device {
    pub fn parse(value: Option<String>) -> Self {
        match value {
            None => Device::Auto,
            Some(v) if v.eq_ignore_ascii_case("cpu") => Device::Cpu(v),
            Some(v) => Device::Named(v),
        }
    }

    /// The device string reported by health checks, `None` for [`Device::Auto`].
    pub fn as_hint(&self) -> Option<&str> {
        match self {
            Device::Auto => None,
            Device::Cpu(name) | Device::Named(name) => Some(name),
        }
    }

    /// CUDA ordinal for a named device: `cuda` is 0, `cuda:N` and bare `N` are N.
    pub fn cuda_device_id(&self) -> Result<Option<i32>, InferenceError> {
        let Device::Named(name) = self else {
            return Ok(None);
        };
        let lowered = name.to_lowercase();
        let ordinal = match lowered.as_str() {
            "cuda" | "gpu" => Some(0),
            other => other
                .strip_prefix("cuda:")
                .unwrap_or(other)
                .parse::<i32>()
                .ok()
                .filter(|id| *id >= 0),
        };
        ordinal
            .map(Some)
            .ok_or_else(|| InferenceError::UnsupportedDevice(name.clone()))
    }
}

/// Process-wide detection settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model_name: String,
    pub model_path: PathBuf,
    pub device: Device,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let model_name =
            optional_var(&lookup, "MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

        let model_path = optional_var(&lookup, "MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| weights_path(&model_name));

        let device = Device::parse(optional_var(&lookup, "DEVICE"));

        let conf_threshold = parse_var(&lookup, "CONF_THRESHOLD", DEFAULT_CONF_THRESHOLD)?;
        let iou_threshold = parse_var(&lookup, "IOU_THRESHOLD", DEFAULT_IOU_THRESHOLD)?;
        let max_detections = parse_var(&lookup, "MAX_DETECTIONS", DEFAULT_MAX_DETECTIONS)?;

        Ok(Self {
            model_name,
            model_path,
            device,
            conf_threshold,
            iou_threshold,
            max_detections,
        })
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_path: weights_path(DEFAULT_MODEL_NAME),
            device: Device::Auto,
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// ONNX weights for a model identifier: `yolov8n.pt` loads `yolov8n.onnx`.
fn weights_path(model_name: &str) -> PathBuf {
    let path = Path::new(model_name);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pt") => path.with_extension("onnx"),
        _ => path.to_path_buf(),
    }
}
