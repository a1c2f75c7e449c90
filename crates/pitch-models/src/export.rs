//! Exported track record handed to callers.
//!
//! The record is keyed by track identity. Keys are track ids rendered as
//! decimal strings (JSON object keys must be strings) and iterate in
//! ascending numeric order. Each value lists the track's observations in
//! increasing frame order:
//!
//! ```json
//! {
//!   "1": [
//!     { "trackId": 1, "position": { "x": 12.5, "y": 40.0 }, "frameIndex": 0 },
//!     { "trackId": 1, "position": { "x": 14.0, "y": 40.5 }, "frameIndex": 1 }
//!   ]
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// A 2D position in source-frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite (JSON has no NaN/Infinity).
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One observation of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    pub track_id: u32,
    pub position: Position,
    pub frame_index: u64,
}

/// Track id → observations, in ascending track id order.
#[derive(Debug, Clone, Default, PartialEq, JsonSchema)]
#[schemars(transparent)]
pub struct ExportRecord(pub BTreeMap<u32, Vec<ExportEntry>>);

impl ExportRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under its track id.
    pub fn push(&mut self, entry: ExportEntry) {
        self.0.entry(entry.track_id).or_default().push(entry);
    }

    pub fn track_count(&self) -> usize {
        self.0.len()
    }

    pub fn entry_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn track(&self, track_id: u32) -> Option<&[ExportEntry]> {
        self.0.get(&track_id).map(Vec::as_slice)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }
}

// Serialized through string keys so the numeric ordering of the BTreeMap
// is preserved in the emitted object.
impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (track_id, entries) in &self.0 {
            map.serialize_entry(&track_id.to_string(), entries)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExportRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, Vec<ExportEntry>> = BTreeMap::deserialize(deserializer)?;
        let mut tracks = BTreeMap::new();
        for (key, entries) in raw {
            let track_id = key
                .parse::<u32>()
                .map_err(|_| serde::de::Error::custom(format!("invalid track id key: {key}")))?;
            tracks.insert(track_id, entries);
        }
        Ok(Self(tracks))
    }
}
