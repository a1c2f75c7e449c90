//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    // Frame loop
    pub const FRAMES_PROCESSED_TOTAL: &str = "pitch_frames_processed_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "pitch_frames_dropped_total";
    pub const FRAME_DURATION_SECONDS: &str = "pitch_frame_duration_seconds";

    // Detection and tracking
    pub const DETECTIONS_TOTAL: &str = "pitch_detections_total";
    pub const TRACKS_CREATED_TOTAL: &str = "pitch_tracks_created_total";
    pub const TRACKS_ACTIVE: &str = "pitch_tracks_active";

    // Output
    pub const ENCODE_FAILURES_TOTAL: &str = "pitch_encode_failures_total";
    pub const RUNS_COMPLETED_TOTAL: &str = "pitch_runs_completed_total";
    pub const RUNS_FAILED_TOTAL: &str = "pitch_runs_failed_total";
    pub const RUN_DURATION_SECONDS: &str = "pitch_run_duration_seconds";
}

/// Record one processed frame and its end-to-end duration.
pub fn record_frame(duration_secs: f64, detections: usize) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    counter!(names::DETECTIONS_TOTAL).increment(detections as u64);
    histogram!(names::FRAME_DURATION_SECONDS).record(duration_secs);
}

/// Record a frame the decoder could not deliver.
pub fn record_frame_dropped() {
    counter!(names::FRAMES_DROPPED_TOTAL).increment(1);
}

pub fn record_tracks_created(count: usize) {
    if count > 0 {
        counter!(names::TRACKS_CREATED_TOTAL).increment(count as u64);
    }
}

pub fn set_active_tracks(count: usize) {
    gauge!(names::TRACKS_ACTIVE).set(count as f64);
}

/// Record a view whose encoder failed.
pub fn record_encode_failure(view: &str) {
    let labels = [("view", view.to_string())];
    counter!(names::ENCODE_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_run_completed(duration_secs: f64, partial: bool) {
    let labels = [("partial", partial.to_string())];
    counter!(names::RUNS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS).record(duration_secs);
}

pub fn record_run_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::RUNS_FAILED_TOTAL, &labels).increment(1);
}
