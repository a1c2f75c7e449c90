//! Track accumulation: per-identity observation history for a whole run.

use std::collections::{BTreeMap, HashSet};

use pitch_models::Position;

use crate::detection::{class_label, BoundingBox, TrackedDetection};
use crate::error::{MediaError, MediaResult};

/// One sighting of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub frame_index: u64,
    /// Foot point in source pixels
    pub position: Position,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Pixels per frame since the previous observation
    pub velocity: Option<Position>,
}

/// Persistent identity and its observations, in increasing frame order.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: u32,
    class_id: usize,
    observations: Vec<Observation>,
    active: bool,
}

impl Track {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn label(&self) -> &'static str {
        class_label(self.class_id)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn first_frame(&self) -> u64 {
        self.observations.first().map_or(0, |o| o.frame_index)
    }

    pub fn last_frame(&self) -> u64 {
        self.observations.last().map_or(0, |o| o.frame_index)
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Observation recorded at exactly `frame_index`.
    pub fn position_at(&self, frame_index: u64) -> Option<Position> {
        self.observations
            .binary_search_by_key(&frame_index, |o| o.frame_index)
            .ok()
            .map(|i| self.observations[i].position)
    }

    /// Observations with frame index ≤ `frame_index`.
    pub fn observations_upto(&self, frame_index: u64) -> &[Observation] {
        let end = self.observations.partition_point(|o| o.frame_index <= frame_index);
        &self.observations[..end]
    }

    /// Path length through all finite positions.
    pub fn distance_travelled(&self) -> f64 {
        self.observations
            .windows(2)
            .map(|w| (w[1].position.x - w[0].position.x).hypot(w[1].position.y - w[0].position.y))
            .filter(|d| d.is_finite())
            .sum()
    }
}

/// Track id → track, in ascending id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTable {
    tracks: BTreeMap<u32, Track>,
}

impl TrackTable {
    pub fn get(&self, track_id: u32) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks observed in `frame_index`, with that frame's observation.
    pub fn active_at(&self, frame_index: u64) -> impl Iterator<Item = (&Track, &Observation)> {
        self.tracks.values().filter_map(move |track| {
            track
                .last()
                .filter(|o| o.frame_index == frame_index)
                .map(|o| (track, o))
        })
    }

    pub fn total_observations(&self) -> usize {
        self.tracks.values().map(|t| t.observations.len()).sum()
    }
}

/// Single writer of the [`TrackTable`].
#[derive(Debug, Default)]
pub struct TrackAccumulator {
    table: TrackTable,
    last_frame: Option<u64>,
}

impl TrackAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's tracked detections.
    ///
    /// Frames must arrive in strictly increasing index order and name each
    /// track at most once; either violation is an internal error and leaves
    /// the table untouched.
    pub fn update(&mut self, frame_index: u64, tracked: &[TrackedDetection]) -> MediaResult<()> {
        if let Some(last) = self.last_frame {
            if frame_index <= last {
                return Err(MediaError::internal(format!(
                    "frame {} delivered after frame {}",
                    frame_index, last
                )));
            }
        }

        let mut seen = HashSet::with_capacity(tracked.len());
        if let Some(dup) = tracked.iter().find(|t| !seen.insert(t.track_id)) {
            return Err(MediaError::internal(format!(
                "track {} assigned twice in frame {}",
                dup.track_id, frame_index
            )));
        }

        for item in tracked {
            let det = &item.detection;
            let position = det.position();
            let track = self.table.tracks.entry(item.track_id).or_insert_with(|| Track {
                id: item.track_id,
                class_id: det.class_id,
                observations: Vec::new(),
                active: true,
            });

            let velocity = track.observations.last().map(|prev| {
                let frames = (frame_index - prev.frame_index) as f64;
                Position::new(
                    (position.x - prev.position.x) / frames,
                    (position.y - prev.position.y) / frames,
                )
            });

            track.active = true;
            track.observations.push(Observation {
                frame_index,
                position,
                bbox: det.bbox,
                confidence: det.confidence,
                velocity,
            });
        }

        self.last_frame = Some(frame_index);
        Ok(())
    }

    /// Record tracks the association step stopped matching.
    pub fn mark_inactive(&mut self, track_ids: &[u32]) {
        for id in track_ids {
            if let Some(track) = self.table.tracks.get_mut(id) {
                track.active = false;
            }
        }
    }

    /// Read-only view of the table after the latest update.
    pub fn snapshot(&self) -> &TrackTable {
        &self.table
    }

    pub fn into_table(self) -> TrackTable {
        self.table
    }
}
