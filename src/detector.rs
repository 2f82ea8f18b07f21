use crate::error::{CacheError, Result};
use log::info;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where to find the detection model and how to run it
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub model_path: PathBuf,
    /// Fetched into `model_path` when the file is missing
    pub model_url: Option<String>,
    /// Intra-op threads for inference
    pub threads: usize,
}

/// Trait for face detector implementations
pub trait FaceDetector {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run the network on a `1 x 3 x H x W` input and return the raw detection
    /// tensor, `1 x classes x top_k x 5` with rows `[score, x1, y1, x2, y2]`
    fn detect(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;
}

/// DSFD (Dual Shot Face Detector) exported to ONNX
pub struct DsfdDetector {
    session: Session,
}

impl DsfdDetector {
    pub fn new(options: &ModelOptions) -> Result<Self> {
        ensure_model(&options.model_path, options.model_url.as_deref())?;

        info!("Loading DSFD model from {:?}", options.model_path);
        let load_error = |e: &dyn std::fmt::Display| {
            CacheError::ModelLoad(format!("{:?}: {}", options.model_path, e))
        };
        let session = Session::builder()
            .map_err(|e| load_error(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(&e))?
            .with_intra_threads(options.threads.max(1))
            .map_err(|e| load_error(&e))?
            .commit_from_file(&options.model_path)
            .map_err(|e| load_error(&e))?;

        Ok(Self { session })
    }
}

impl FaceDetector for DsfdDetector {
    fn name(&self) -> &str {
        "dsfd"
    }

    fn detect(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_array(([n, c, h, w], data.into_boxed_slice()))
            .map_err(|e| CacheError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| CacheError::Inference(e.to_string()))?;

        let (_, detections) = outputs
            .iter()
            .next()
            .ok_or_else(|| CacheError::Inference("model produced no outputs".to_string()))?;
        let (shape, data) = detections
            .try_extract_tensor::<f32>()
            .map_err(|e| CacheError::Inference(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let [b, classes, top_k, fields] = dims[..] else {
            return Err(CacheError::InvalidDetectionShape(dims));
        };

        Array4::from_shape_vec((b, classes, top_k, fields), data.to_vec())
            .map_err(|_| CacheError::InvalidDetectionShape(dims))
    }
}

/// Download the model file if it doesn't exist and a source URL is known
fn ensure_model(model_path: &Path, model_url: Option<&str>) -> Result<()> {
    if model_path.exists() {
        info!("Model already exists at: {:?}", model_path);
        return Ok(());
    }

    let Some(url) = model_url else {
        return Err(CacheError::ModelLoad(format!(
            "model file {:?} not found; pass --model-url to download it",
            model_path
        )));
    };

    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("Downloading face detection model from: {}", url);
    let response = ureq::get(url)
        .call()
        .map_err(|e| CacheError::ModelLoad(format!("failed to download {}: {}", url, e)))?;

    save_model(&mut response.into_reader(), model_path)?;

    info!("Model downloaded to {:?}", model_path);
    Ok(())
}

/// Stream a model into `<model>.part` and move it into place once complete
fn save_model(reader: &mut dyn Read, model_path: &Path) -> Result<()> {
    let partial = model_path.with_extension("part");
    let written = std::fs::File::create(&partial).and_then(|mut file| {
        std::io::copy(reader, &mut file)?;
        file.sync_all()
    });

    if let Err(err) = written {
        let _ = std::fs::remove_file(&partial);
        return Err(err.into());
    }

    std::fs::rename(&partial, model_path)?;
    Ok(())
}

// Factory function to create detectors by name
pub fn create_detector(name: &str, options: &ModelOptions) -> Result<Box<dyn FaceDetector>> {
    match name.to_lowercase().as_str() {
        "dsfd" => Ok(Box::new(DsfdDetector::new(options)?)),
        _ => Err(CacheError::UnknownDetector(name.to_string())),
    }
}
