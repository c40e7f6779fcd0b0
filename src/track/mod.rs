//! Multi-object tracking.
//!
//! A tracker sits between the detector and the annotator and gives each
//! object a stable numeric identity across frames. It only labels
//! detections; it never adds or removes any, so the alert condition is the
//! same with or without tracking.

mod byte_tracker;
mod matching;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

pub use byte_tracker::ByteTracker;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    #[default]
    None,
    ByteTrack,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::None => "none",
            TrackerKind::ByteTrack => "bytetrack",
        }
    }

    /// Tracker for a stream of `frame_rate` frames per second, if any.
    pub fn build(&self, frame_rate: u32) -> Option<ByteTracker> {
        match self {
            TrackerKind::None => None,
            TrackerKind::ByteTrack => Some(ByteTracker::new(TrackerConfig {
                frame_rate: frame_rate.max(1) as f32,
                ..TrackerConfig::default()
            })),
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "" => Ok(TrackerKind::None),
            "bytetrack" | "bytetrack.yaml" => Ok(TrackerKind::ByteTrack),
            other => Err(anyhow!(
                "unknown tracker '{}'; expected none or bytetrack",
                other
            )),
        }
    }
}

/// ByteTrack tuning.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Detections at or above this score take part in the first association.
    pub high_thresh: f32,
    /// Detections below this score are ignored by the tracker.
    pub low_thresh: f32,
    /// Minimum score for opening a new track.
    pub new_track_thresh: f32,
    /// Largest fused cost accepted in the first association.
    pub match_thresh: f32,
    /// Frames (at 30 fps) a lost track is kept for re-identification.
    pub track_buffer: u32,
    pub frame_rate: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            high_thresh: 0.25,
            low_thresh: 0.1,
            new_track_thresh: 0.25,
            match_thresh: 0.8,
            track_buffer: 30,
            frame_rate: 30.0,
        }
    }
}
