use common::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("unsupported device `{0}`: expected `cpu`, `cuda`, `cuda:N` or a CUDA ordinal")]
    UnsupportedDevice(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InferenceError {
    /// Wrap a backend failure, keeping the whole cause chain in the message.
    pub fn inference(err: anyhow::Error) -> Self {
        Self::Inference(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_keeps_cause_chain() {
        let err = anyhow::anyhow!("shape mismatch").context("decoding output0");
        let wrapped = InferenceError::inference(err);
        assert_eq!(
            wrapped.to_string(),
            "inference failed: decoding output0: shape mismatch"
        );
    }

    #[test]
    fn test_unsupported_device_display() {
        let err = InferenceError::UnsupportedDevice("mps".to_string());
        assert!(err.to_string().starts_with("unsupported device `mps`"));
    }
}
