//! Detection filtering, association and track accumulation.

mod accumulator;
mod tracker;

pub use accumulator::{Observation, Track, TrackAccumulator, TrackTable};
pub use tracker::{Association, CentroidTracker};

use std::sync::Arc;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::detection::{Detection, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Runs the detector on a frame and associates the surviving detections.
pub struct DetectorTracker {
    detector: Arc<dyn ObjectDetector>,
    config: TrackerConfig,
    tracker: CentroidTracker,
}

impl DetectorTracker {
    pub fn new(detector: Arc<dyn ObjectDetector>, config: TrackerConfig) -> Self {
        let tracker = CentroidTracker::new(config.max_match_distance, config.max_inactive_frames);
        Self {
            detector,
            config,
            tracker,
        }
    }

    /// Detect and associate one frame.
    ///
    /// A detector error is returned as `DetectionFailed`; invalid boxes are
    /// dropped rather than failing the frame.
    pub fn process(&mut self, frame: &Frame) -> MediaResult<Association> {
        let raw = self.detector.detect(frame).map_err(|e| match e {
            MediaError::DetectionFailed(_) => e,
            other => MediaError::detection_failed(format!("frame {}: {}", frame.index(), other)),
        })?;

        let raw_count = raw.len();
        let kept = self.filter(raw);
        debug!(
            frame = frame.index(),
            raw = raw_count,
            kept = kept.len(),
            "Filtered detections"
        );

        Ok(self.tracker.update(frame.index(), &kept))
    }

    fn filter(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| {
                if !d.is_valid() {
                    debug!(?d, "Dropping invalid detection");
                    return false;
                }
                d.confidence >= self.config.confidence_threshold && self.config.accepts_class(d.class_id)
            })
            .collect()
    }

    pub fn active_track_count(&self) -> usize {
        self.tracker.active_track_count()
    }
}
