//! Conversion of the track table into caller-facing plain data.

use pitch_models::{ExportEntry, ExportRecord, TrackSummary};
use tracing::debug;

use crate::tracking::TrackTable;

/// Build the Export Record: every finite observation, keyed by track id.
///
/// Pure and deterministic; tracks whose positions are all non-finite are
/// omitted entirely.
pub fn export(table: &TrackTable) -> ExportRecord {
    let mut record = ExportRecord::new();
    let mut skipped = 0usize;

    for track in table.iter() {
        for observation in track.observations() {
            if !observation.position.is_finite() {
                skipped += 1;
                continue;
            }
            record.push(ExportEntry {
                track_id: track.id(),
                position: observation.position,
                frame_index: observation.frame_index,
            });
        }
    }

    if skipped > 0 {
        debug!(skipped, "Skipped non-finite positions in export");
    }
    record
}

/// Per-track statistics in ascending track id order.
pub fn summarize(table: &TrackTable, fps: f64) -> Vec<TrackSummary> {
    table
        .iter()
        .map(|track| {
            let distance = track.distance_travelled();
            let span_frames = track.last_frame().saturating_sub(track.first_frame()) as f64;
            let mean_speed = if span_frames > 0.0 && fps > 0.0 {
                distance / (span_frames / fps)
            } else {
                0.0
            };

            TrackSummary {
                track_id: track.id(),
                class_id: track.class_id(),
                label: track.label().to_string(),
                first_frame: track.first_frame(),
                last_frame: track.last_frame(),
                observations: track.observations().len(),
                distance_px: distance,
                mean_speed_px_per_sec: mean_speed,
            }
        })
        .collect()
}
