//! Object detection.
//!
//! Detectors are injected into the pipeline as `Arc<dyn ObjectDetector>`;
//! the caller owns the model handle and its lifecycle. Every detection
//! crossing this boundary is in source-frame pixel coordinates.

#[cfg(feature = "onnx")]
pub mod yolo;

use pitch_models::Position;
use serde::{Deserialize, Serialize};

use crate::error::MediaResult;
use crate::frame::Frame;

#[cfg(feature = "onnx")]
pub use yolo::{YoloConfig, YoloDetector};

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

pub const CLASS_PERSON: usize = 0;
pub const CLASS_SPORTS_BALL: usize = 32;

/// Human-readable label for a COCO class id.
pub fn class_label(class_id: usize) -> &'static str {
    COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Bottom-centre of the box, where a standing player touches the ground.
    pub fn foot_point(&self) -> Position {
        Position::new(self.cx(), self.y2())
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One object found in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// COCO class id
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    pub fn label(&self) -> &'static str {
        class_label(self.class_id)
    }

    pub fn position(&self) -> Position {
        self.bbox.foot_point()
    }

    /// Finite coordinates, positive size and a confidence within [0, 1].
    pub fn is_valid(&self) -> bool {
        let b = &self.bbox;
        b.x.is_finite()
            && b.y.is_finite()
            && b.width.is_finite()
            && b.height.is_finite()
            && b.width > 0.0
            && b.height > 0.0
            && (0.0..=1.0).contains(&self.confidence)
    }
}

/// A detection with the track identity assigned to it in its frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    pub track_id: u32,
    pub detection: Detection,
}

/// Per-frame object detector.
///
/// Implementations are shared across the rayon pool and must be callable
/// from any thread.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the model is loaded and usable before any frame is read.
    ///
    /// Fails with [`MediaError::ModelUnavailable`](crate::MediaError::ModelUnavailable).
    fn ensure_ready(&self) -> MediaResult<()>;

    /// Raw detections for one frame, in pixel coordinates.
    fn detect(&self, frame: &Frame) -> MediaResult<Vec<Detection>>;
}

/// Greedy per-class Non-Maximum Suppression.
///
/// Keeps the highest-confidence box of every overlapping same-class group.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, y: f64, class_id: usize, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(x, y, 10.0, 20.0), class_id, confidence)
    }

    #[test]
    fn test_foot_point_is_bottom_centre() {
        let d = det(100.0, 50.0, CLASS_PERSON, 0.9);
        assert_eq!(d.position(), Position::new(105.0, 70.0));
    }

    #[test]
    fn test_validation() {
        assert!(det(0.0, 0.0, 0, 0.5).is_valid());
        assert!(det(-4.0, 0.0, 0, 1.0).is_valid());
        assert!(!det(f64::NAN, 0.0, 0, 0.5).is_valid());
        assert!(!det(0.0, 0.0, 0, 1.5).is_valid());
        assert!(!Detection::new(BoundingBox::new(0.0, 0.0, 0.0, 5.0), 0, 0.5).is_valid());
        assert!(!Detection::new(BoundingBox::new(0.0, 0.0, 5.0, f64::INFINITY), 0, 0.5).is_valid());
    }

    #[test]
    fn test_class_labels() {
        assert_eq!(COCO_CLASSES.len(), 80);
        assert_eq!(class_label(CLASS_PERSON), "person");
        assert_eq!(class_label(CLASS_SPORTS_BALL), "sports ball");
        assert_eq!(class_label(999), "unknown");
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 5.0, 5.0)), 0.0);
        let half = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let kept = non_maximum_suppression(
            vec![
                det(0.0, 0.0, CLASS_PERSON, 0.6),
                det(1.0, 0.0, CLASS_PERSON, 0.9),
                det(1.0, 0.0, CLASS_SPORTS_BALL, 0.4),
                det(200.0, 0.0, CLASS_PERSON, 0.3),
            ],
            0.45,
        );

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class_id == CLASS_SPORTS_BALL));
    }
}
