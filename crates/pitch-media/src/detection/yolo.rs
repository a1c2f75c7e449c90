//! YOLOv8 detector on ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{non_maximum_suppression, BoundingBox, Detection, ObjectDetector, COCO_CLASSES};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Box coordinates (cx, cy, w, h) preceding the class scores in each column.
const BOX_FEATURES: usize = 4;

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Minimum class score kept before NMS
    pub score_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f64,
    /// Square model input size
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            score_threshold: 0.1,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Object detector using a YOLOv8 ONNX export.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Load the model.
    ///
    /// Fails with `ModelUnavailable` if the file is missing or unloadable.
    pub fn load(config: YoloConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_unavailable(format!(
                "model file not found: {}",
                config.model_path.display()
            )));
        }

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            "YOLO detector initialized"
        );

        Ok(Self { session, config })
    }

    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    /// Resize to the model input and convert HWC bytes to a normalized NCHW tensor.
    fn preprocess(&self, image: &RgbImage) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            chw[i] = pixel[0] as f32 / 255.0;
            chw[plane + i] = pixel[1] as f32 / 255.0;
            chw[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + classes, candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }

    /// Decode the `[4 + C, N]` output into pixel-space detections.
    fn postprocess(&self, outputs: &[f32], width: u32, height: u32) -> MediaResult<Vec<Detection>> {
        let features = BOX_FEATURES + COCO_CLASSES.len();
        if outputs.is_empty() || outputs.len() % features != 0 {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output size {} for {} features",
                outputs.len(),
                features
            )));
        }
        let candidates = outputs.len() / features;

        let grid = ArrayView2::from_shape((features, candidates), outputs)
            .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;

        let input_size = self.config.input_size as f64;
        let scale_w = width as f64 / input_size;
        let scale_h = height as f64 / input_size;

        let mut detections = Vec::new();
        for i in 0..candidates {
            let (class_id, score) = (0..COCO_CLASSES.len())
                .map(|c| (c, grid[[BOX_FEATURES + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < self.config.score_threshold {
                continue;
            }

            let cx = grid[[0, i]] as f64 * scale_w;
            let cy = grid[[1, i]] as f64 * scale_h;
            let w = grid[[2, i]] as f64 * scale_w;
            let h = grid[[3, i]] as f64 * scale_h;

            // Clip to the frame
            let x1 = (cx - w / 2.0).clamp(0.0, width as f64);
            let y1 = (cy - h / 2.0).clamp(0.0, height as f64);
            let x2 = (cx + w / 2.0).clamp(0.0, width as f64);
            let y2 = (cy + h / 2.0).clamp(0.0, height as f64);

            detections.push(Detection::new(
                BoundingBox::new(x1, y1, x2 - x1, y2 - y1),
                class_id,
                score.clamp(0.0, 1.0),
            ));
        }

        Ok(non_maximum_suppression(detections, self.config.nms_threshold))
    }
}

impl ObjectDetector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolov8"
    }

    /// Runs one inference on a blank frame to confirm the output layout.
    fn ensure_ready(&self) -> MediaResult<()> {
        let size = self.config.input_size;
        let blank = RgbImage::new(size, size);
        let input = self
            .preprocess(&blank)
            .map_err(|e| MediaError::model_unavailable(e.to_string()))?;
        let outputs = self
            .run_inference(input)
            .map_err(|e| MediaError::model_unavailable(e.to_string()))?;
        self.postprocess(&outputs, size, size)
            .map_err(|e| MediaError::model_unavailable(e.to_string()))?;
        Ok(())
    }

    fn detect(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let input = self.preprocess(frame.image())?;
        let outputs = self.run_inference(input)?;
        let detections = self.postprocess(&outputs, frame.width(), frame.height())?;

        debug!(frame = frame.index(), count = detections.len(), "Detection completed");
        Ok(detections)
    }
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::model_unavailable(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::model_unavailable(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_unavailable(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_unavailable(format!("Failed to load ONNX model: {}", e)))
}
