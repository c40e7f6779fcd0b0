//! Stored video file source.
//!
//! `FileSource` decodes a local video file frame by frame and ends cleanly at
//! the end of the file. Real files are decoded with FFmpeg (feature
//! `ingest-file-ffmpeg`); `stub://` paths produce a synthetic clip.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::SyntheticSource;
use super::{FrameSource, IngestSettings, SourceStats};
use crate::frame::Frame;

/// Frames in a synthetic clip without an explicit `frames` parameter.
const SYNTHETIC_CLIP_FRAMES: u64 = 100;

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(path: &str, settings: &IngestSettings) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video playback only supports local paths (no URL schemes): '{}'",
                path
            ));
        }
        if path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::parse(
                    path,
                    Some(SYNTHETIC_CLIP_FRAMES),
                )?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(path, settings)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                let _ = settings;
                Err(anyhow!(
                    "video file playback requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("video file {}", self.stats().location)
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect("FileSource"),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_rejects_urls() {
        let settings = IngestSettings::default();
        assert!(FileSource::new("rtsp://camera/stream", &settings).is_err());
        assert!(FileSource::new("   ", &settings).is_err());
    }

    #[test]
    fn synthetic_clip_ends() -> Result<()> {
        let mut source = FileSource::new("stub://clip?frames=3", &IngestSettings::default())?;
        source.connect()?;
        let mut seen = 0;
        while source.next_frame()?.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn synthetic_clip_has_default_length() -> Result<()> {
        let mut source = FileSource::new("stub://clip", &IngestSettings::default())?;
        source.connect()?;
        let mut seen = 0u64;
        while source.next_frame()?.is_some() {
            seen += 1;
        }
        assert_eq!(seen, SYNTHETIC_CLIP_FRAMES);
        Ok(())
    }
}
