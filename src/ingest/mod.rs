//! Frame ingestion sources.
//!
//! Three kinds of source feed the monitor:
//! - Stored video files (feature: ingest-file-ffmpeg)
//! - A single webcam snapshot, from an image file or a V4L2 device (feature: ingest-v4l2)
//! - RTSP network streams (feature: rtsp-gstreamer)
//!
//! Every source also accepts `stub://` locations that generate synthetic
//! frames, so the monitor can be exercised without media libraries. A
//! `?frames=N` suffix bounds a synthetic stream to `N` frames.
//!
//! Sources yield `Frame`s until `next_frame` returns `Ok(None)` (end of
//! stream). Read failures are returned as errors; the monitor treats them as
//! the end of the run.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
pub mod file;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod rtsp;
pub mod snapshot;
mod synthetic;

use std::time::Duration;

use anyhow::Result;

use crate::frame::Frame;

pub use file::FileSource;
pub use rtsp::RtspSource;
pub use snapshot::SnapshotSource;

pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TARGET_FPS: u32 = 10;
pub const DEFAULT_WEBCAM_WARMUP_FRAMES: u32 = 3;

/// Shared ingestion tuning.
#[derive(Clone, Debug)]
pub struct IngestSettings {
    /// Longest wait for a single network frame before the stream counts as stalled.
    pub read_timeout: Duration,
    /// Nominal frame rate, used to size health windows.
    pub target_fps: u32,
    /// Frames discarded from a webcam before the snapshot is taken.
    pub webcam_warmup_frames: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            target_fps: DEFAULT_TARGET_FPS,
            webcam_warmup_frames: DEFAULT_WEBCAM_WARMUP_FRAMES,
        }
    }
}

/// What the operator asked to watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Stored video file.
    Video(String),
    /// Single-shot camera capture: an image file or a device node.
    Webcam(String),
    /// Network stream URL.
    Rtsp(String),
}

impl SourceSpec {
    pub fn location(&self) -> &str {
        match self {
            SourceSpec::Video(path) | SourceSpec::Webcam(path) | SourceSpec::Rtsp(path) => path,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub location: String,
}

/// Producer of a finite or endless sequence of frames.
pub trait FrameSource {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    /// Open the underlying media.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Open (but do not connect) the backend matching `spec`.
pub fn open_source(spec: &SourceSpec, settings: &IngestSettings) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match spec {
        SourceSpec::Video(path) => Box::new(FileSource::new(path, settings)?),
        SourceSpec::Webcam(device) => Box::new(SnapshotSource::new(device, settings)?),
        SourceSpec::Rtsp(url) => Box::new(RtspSource::new(url, settings)?),
    };
    Ok(source)
}
