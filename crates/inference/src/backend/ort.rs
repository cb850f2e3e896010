use super::{ClassNames, DetectParams, Detector, DetectorOutput, lock_unpoisoned};
use crate::config::Device;
use crate::errors::InferenceError;
use crate::postprocessing::{
    PostProcessor, parse_class_names, parse_input_size, static_input_size,
};
use crate::preprocessing::{DEFAULT_INPUT_SIZE, PreProcessor};
use image::RgbImage;
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProviderDispatch},
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Tensor names used by Ultralytics ONNX exports.
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

struct Engine {
    session: Session,
    preprocessor: PreProcessor,
}

/// YOLOv8 detector running on ONNX Runtime.
///
/// `Session::run` needs exclusive access, so the session and its scratch
/// buffers sit behind one mutex and concurrent callers are serialised.
/// A panic inside `detect` does not take the detector out of service.
pub struct OrtDetector {
    engine: Mutex<Engine>,
    names: Option<Arc<ClassNames>>,
}

impl OrtDetector {
    /// Load an ONNX export and bind it to `device`.
    pub fn load(path: &Path, device: &Device) -> Result<Self, InferenceError> {
        let load_error = |reason: String| InferenceError::ModelLoad {
            path: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            return Err(load_error("file not found".to_string()));
        }

        let providers = execution_providers(device)?;

        let session = build_session(path, providers).map_err(|e| load_error(format!("{e:#}")))?;

        let (names, input_size) = read_metadata(&session);

        match &names {
            Some(names) => tracing::info!(classes = names.len(), "Loaded class names from model metadata"),
            None => tracing::warn!("Model carries no class names, ids will be reported as labels"),
        }

        tracing::info!(
            path = %path.display(),
            device = ?device,
            input_width = input_size.0,
            input_height = input_size.1,
            "Model loaded"
        );

        Ok(Self {
            engine: Mutex::new(Engine {
                session,
                preprocessor: PreProcessor::new(input_size),
            }),
            names: names.map(Arc::new),
        })
    }
}

impl Detector for OrtDetector {
    fn detect(
        &self,
        image: &RgbImage,
        params: &DetectParams,
    ) -> anyhow::Result<Option<DetectorOutput>> {
        // No state survives between calls, so a panicked call leaves the engine usable.
        let mut engine = lock_unpoisoned(&self.engine);
        let Engine {
            session,
            preprocessor,
        } = &mut *engine;

        let (input, letterbox) = preprocessor.preprocess(image)?;

        let outputs = {
            let _infer_span = tracing::info_span!("model_inference").entered();
            session.run(ort::inputs![
                INPUT_NAME => TensorRef::from_array_view(input.view())?
            ])?
        };

        let Some(output) = outputs.get(OUTPUT_NAME) else {
            return Ok(None);
        };
        let output = output.try_extract_array::<f32>()?;

        let boxes = PostProcessor::from(params).parse_detections(&output, &letterbox)?;

        Ok(Some(DetectorOutput {
            boxes: Some(boxes),
            names: self.names.clone(),
        }))
    }
}

fn build_session(
    path: &Path,
    providers: Vec<ExecutionProviderDispatch>,
) -> anyhow::Result<Session> {
    // Initialize ORT environment (idempotent)
    let _ = ort::init().commit();

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    if !providers.is_empty() {
        builder = builder.with_execution_providers(providers)?;
    }

    Ok(builder.commit_from_file(path)?)
}

fn execution_providers(device: &Device) -> Result<Vec<ExecutionProviderDispatch>, InferenceError> {
    let providers = match (device, device.cuda_device_id()?) {
        (Device::Cpu(_), _) => {
            tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            vec![]
        }
        (Device::Auto, _) => {
            tracing::info!("Initializing ONNX Runtime with CUDA execution provider, CPU fallback");
            vec![CUDAExecutionProvider::default().build()]
        }
        (Device::Named(_), Some(device_id)) => {
            tracing::info!(device_id, "Initializing ONNX Runtime with CUDA execution provider");
            vec![
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()
                    .error_on_failure(),
            ]
        }
        (Device::Named(name), None) => {
            return Err(InferenceError::UnsupportedDevice(name.clone()));
        }
    };
    Ok(providers)
}

/// Class names from Ultralytics custom metadata, and the input size.
///
/// The input size is the model's static input shape when it has one, then the
/// `imgsz` metadata entry, then [`DEFAULT_INPUT_SIZE`].
fn read_metadata(session: &Session) -> (Option<ClassNames>, (u32, u32)) {
    let static_size = session
        .inputs
        .first()
        .and_then(|input| input.input_type.tensor_shape())
        .and_then(|shape| static_input_size(shape));

    let metadata = match session.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read model metadata");
            return (None, static_size.unwrap_or(DEFAULT_INPUT_SIZE));
        }
    };

    let names = match metadata.custom("names") {
        Ok(Some(raw)) => parse_class_names(&raw),
        _ => None,
    };

    let input_size = static_size.unwrap_or_else(|| match metadata.custom("imgsz") {
        Ok(Some(raw)) => parse_input_size(&raw).unwrap_or(DEFAULT_INPUT_SIZE),
        _ => DEFAULT_INPUT_SIZE,
    });

    (names, input_size)
}
