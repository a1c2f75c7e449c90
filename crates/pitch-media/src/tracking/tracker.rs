//! Centroid tracker for keeping object identity across frames.
//!
//! Matches detections to live tracks by foot-point distance. All
//! (track, detection) pairs inside the gate are sorted by distance and
//! assigned greedily, so the globally closest pair always wins and equal
//! distances go to the lowest track id.
//!
//! Aging is measured in frame indices, not calls: frames that never reach
//! the tracker (corrupt slots) still count as unmatched.

use std::collections::BTreeMap;

use pitch_models::Position;

use crate::detection::{Detection, TrackedDetection};

/// Association state of one track.
#[derive(Debug, Clone)]
struct LiveTrack {
    /// Last matched foot point
    position: Position,
    class_id: usize,
    /// Frame index of the last match
    last_seen: u64,
    /// Still a candidate for matching
    active: bool,
}

/// Result of associating one frame.
#[derive(Debug, Default)]
pub struct Association {
    /// Detections with their track ids, in detection order
    pub tracked: Vec<TrackedDetection>,
    /// Number of tracks created this frame
    pub created: usize,
    /// Tracks that went inactive this frame
    pub deactivated: Vec<u32>,
}

/// Greedy nearest-neighbour tracker on foot points.
pub struct CentroidTracker {
    /// Gate on foot-point distance in pixels
    max_distance: f64,
    /// Unmatched frames tolerated before a track goes inactive
    max_inactive: u32,
    tracks: BTreeMap<u32, LiveTrack>,
    next_track_id: u32,
}

impl CentroidTracker {
    pub fn new(max_distance: f64, max_inactive: u32) -> Self {
        Self {
            max_distance,
            max_inactive,
            tracks: BTreeMap::new(),
            next_track_id: 1,
        }
    }

    /// Associate the detections of frame `frame_index` with existing tracks.
    ///
    /// Frame indices must increase between calls.
    pub fn update(&mut self, frame_index: u64, detections: &[Detection]) -> Association {
        let positions: Vec<Position> = detections.iter().map(Detection::position).collect();
        let mut outcome = Association::default();

        // Tracks already unmatched for too long across skipped frames
        let max_inactive = u64::from(self.max_inactive);
        for (&track_id, track) in self.tracks.iter_mut().filter(|(_, t)| t.active) {
            if frame_index.saturating_sub(track.last_seen) > max_inactive + 1 {
                track.active = false;
                outcome.deactivated.push(track_id);
            }
        }

        let mut pairs: Vec<(f64, u32, usize)> = Vec::new();
        for (&track_id, track) in self.tracks.iter().filter(|(_, t)| t.active) {
            for (det_idx, det) in detections.iter().enumerate() {
                if det.class_id != track.class_id {
                    continue;
                }
                let distance = distance(&track.position, &positions[det_idx]);
                if distance <= self.max_distance {
                    pairs.push((distance, track_id, det_idx));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];
        let mut matched_tracks: Vec<u32> = Vec::new();
        for (_, track_id, det_idx) in pairs {
            if assigned[det_idx].is_some() || matched_tracks.contains(&track_id) {
                continue;
            }
            assigned[det_idx] = Some(track_id);
            matched_tracks.push(track_id);
        }

        for (det_idx, det) in detections.iter().enumerate() {
            let track_id = match assigned[det_idx] {
                Some(track_id) => {
                    if let Some(track) = self.tracks.get_mut(&track_id) {
                        track.position = positions[det_idx];
                        track.last_seen = frame_index;
                    }
                    track_id
                }
                None => {
                    let track_id = self.next_track_id;
                    self.next_track_id += 1;
                    self.tracks.insert(
                        track_id,
                        LiveTrack {
                            position: positions[det_idx],
                            class_id: det.class_id,
                            last_seen: frame_index,
                            active: true,
                        },
                    );
                    matched_tracks.push(track_id);
                    outcome.created += 1;
                    track_id
                }
            };
            outcome.tracked.push(TrackedDetection {
                track_id,
                detection: det.clone(),
            });
        }

        // Age tracks that found no detection, counting this frame
        for (&track_id, track) in self.tracks.iter_mut() {
            if !track.active || matched_tracks.contains(&track_id) {
                continue;
            }
            if frame_index.saturating_sub(track.last_seen) > max_inactive {
                track.active = false;
                outcome.deactivated.push(track_id);
            }
        }

        outcome
    }

    /// Number of tracks still eligible for matching.
    pub fn active_track_count(&self) -> usize {
        self.tracks.values().filter(|t| t.active).count()
    }

    /// Total tracks ever created.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

fn distance(a: &Position, b: &Position) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, CLASS_PERSON, CLASS_SPORTS_BALL};

    /// Detection whose foot point is (x, y).
    fn at(x: f64, y: f64, class_id: usize) -> Detection {
        Detection::new(BoundingBox::new(x - 5.0, y - 20.0, 10.0, 20.0), class_id, 0.9)
    }

    fn ids(association: &Association) -> Vec<u32> {
        association.tracked.iter().map(|t| t.track_id).collect()
    }

    #[test]
    fn test_new_tracks_numbered_in_detection_order() {
        let mut tracker = CentroidTracker::new(80.0, 30);
        let first = tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON), at(400.0, 100.0, CLASS_PERSON)]);

        assert_eq!(ids(&first), vec![1, 2]);
        assert_eq!(first.created, 2);
    }

    #[test]
    fn test_moving_object_keeps_identity() {
        let mut tracker = CentroidTracker::new(80.0, 30);
        for step in 0..10 {
            let association = tracker.update(step, &[at(step as f64 * 10.0, 50.0, CLASS_PERSON)]);
            assert_eq!(ids(&association), vec![1]);
        }
        assert_eq!(tracker.track_count(), 1);
    }

    #[test]
    fn test_closest_pair_wins_regardless_of_detection_order() {
        let mut tracker = CentroidTracker::new(80.0, 30);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON), at(200.0, 100.0, CLASS_PERSON)]);

        // Detection listed first is closer to track 2
        let association =
            tracker.update(1, &[at(190.0, 100.0, CLASS_PERSON), at(110.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&association), vec![2, 1]);
    }

    #[test]
    fn test_equal_distance_goes_to_lowest_track_id() {
        let mut tracker = CentroidTracker::new(80.0, 30);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON), at(140.0, 100.0, CLASS_PERSON)]);

        let association = tracker.update(1, &[at(120.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&association), vec![1]);
    }

    #[test]
    fn test_gate_and_class_prevent_matches() {
        let mut tracker = CentroidTracker::new(80.0, 30);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON)]);

        let far = tracker.update(1, &[at(300.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&far), vec![2]);

        let ball = tracker.update(2, &[at(300.0, 100.0, CLASS_SPORTS_BALL)]);
        assert_eq!(ids(&ball), vec![3]);
    }

    #[test]
    fn test_track_goes_inactive_after_gap() {
        let mut tracker = CentroidTracker::new(80.0, 2);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON)]);

        assert!(tracker.update(1, &[]).deactivated.is_empty());
        assert!(tracker.update(2, &[]).deactivated.is_empty());
        assert_eq!(tracker.update(3, &[]).deactivated, vec![1]);
        assert_eq!(tracker.active_track_count(), 0);

        // Same spot, but the old identity is never reused
        let association = tracker.update(4, &[at(100.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&association), vec![2]);
    }

    #[test]
    fn test_match_allowed_right_at_the_limit() {
        let mut tracker = CentroidTracker::new(80.0, 2);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON)]);

        // Frames 1 and 2 never reached the tracker
        let association = tracker.update(3, &[at(105.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&association), vec![1]);
        assert!(association.deactivated.is_empty());
    }

    #[test]
    fn test_skipped_frames_age_tracks() {
        let mut tracker = CentroidTracker::new(80.0, 2);
        tracker.update(0, &[at(100.0, 100.0, CLASS_PERSON)]);

        // Frames 1..=5 were corrupt and never reached the tracker
        let association = tracker.update(6, &[at(100.0, 100.0, CLASS_PERSON)]);
        assert_eq!(ids(&association), vec![2]);
        assert_eq!(association.deactivated, vec![1]);
        assert_eq!(tracker.track_count(), 2);
        assert_eq!(tracker.active_track_count(), 1);
    }
}
