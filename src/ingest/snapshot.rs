//! Webcam snapshot source.
//!
//! A snapshot source yields exactly one frame and then ends. The frame comes
//! from one of:
//! - an image file already captured by a camera (JPEG or PNG)
//! - a V4L2 device node such as `/dev/video0` (feature `ingest-v4l2`)
//! - a `stub://` location (synthetic frame)
//!
//! Devices are opened, read once after a short warm-up, and released inside
//! `connect`, so nothing stays open while the frame is processed.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use super::synthetic::SyntheticSource;
use super::{FrameSource, IngestSettings, SourceStats};
use crate::frame::Frame;

/// Single-shot camera source.
pub struct SnapshotSource {
    location: String,
    backend: SnapshotBackend,
    pending: Option<Frame>,
    frames_captured: u64,
}

enum SnapshotBackend {
    Synthetic(SyntheticSource),
    ImageFile,
    #[cfg(feature = "ingest-v4l2")]
    Device { warmup_frames: u32 },
}

impl SnapshotSource {
    pub fn new(location: &str, settings: &IngestSettings) -> Result<Self> {
        if location.trim().is_empty() {
            return Err(anyhow!("webcam source needs an image path or device"));
        }
        let backend = if location.starts_with("stub://") {
            SnapshotBackend::Synthetic(SyntheticSource::parse(location, Some(1))?)
        } else if location.starts_with("/dev/video") {
            #[cfg(feature = "ingest-v4l2")]
            {
                SnapshotBackend::Device {
                    warmup_frames: settings.webcam_warmup_frames,
                }
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                let _ = settings;
                return Err(anyhow!(
                    "webcam capture from {} requires the ingest-v4l2 feature",
                    location
                ));
            }
        } else {
            SnapshotBackend::ImageFile
        };
        Ok(Self {
            location: location.to_string(),
            backend,
            pending: None,
            frames_captured: 0,
        })
    }
}

impl FrameSource for SnapshotSource {
    fn describe(&self) -> String {
        format!("webcam snapshot {}", self.location)
    }

    fn connect(&mut self) -> Result<()> {
        let frame = match &mut self.backend {
            SnapshotBackend::Synthetic(source) => {
                source.connect("SnapshotSource")?;
                source.next_frame()?
            }
            SnapshotBackend::ImageFile => Some(load_image_file(&self.location)?),
            #[cfg(feature = "ingest-v4l2")]
            SnapshotBackend::Device { warmup_frames } => {
                Some(capture_device_frame(&self.location, *warmup_frames)?)
            }
        };
        self.pending = frame;
        log::info!("SnapshotSource: captured {}", self.location);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.pending.take();
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            location: self.location.clone(),
        }
    }
}

fn load_image_file(path: &str) -> Result<Frame> {
    let path = Path::new(path);
    let image = image::open(path)
        .with_context(|| format!("failed to read camera image {}", path.display()))?
        .to_rgb8();
    Ok(Frame::new(image, 1))
}

#[cfg(feature = "ingest-v4l2")]
fn capture_device_frame(device_path: &str, warmup_frames: u32) -> Result<Frame> {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;

    use super::normalize::{normalize_to_rgb, PixelFormat};

    let mut device = v4l::Device::with_path(device_path)
        .with_context(|| format!("open v4l2 device {}", device_path))?;
    let mut format = device.format().context("read v4l2 format")?;
    format.fourcc = v4l::FourCC::new(b"MJPG");
    let format = match device.set_format(&format) {
        Ok(format) => format,
        Err(err) => {
            log::warn!(
                "SnapshotSource: failed to request MJPG on {}: {}",
                device_path,
                err
            );
            device
                .format()
                .context("read v4l2 format after set failure")?
        }
    };

    let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
        anyhow!(
            "unsupported v4l2 pixel format {} on {}",
            format.fourcc,
            device_path
        )
    })?;

    let mut stream = v4l::prelude::MmapStream::with_buffers(&mut device, Type::VideoCapture, 4)
        .context("create v4l2 buffer stream")?;

    // Auto-exposure needs a few frames to settle.
    for _ in 0..warmup_frames {
        stream.next().context("capture v4l2 warm-up frame")?;
    }
    let (buf, _meta) = stream.next().context("capture v4l2 frame")?;

    let (pixels, width, height) =
        normalize_to_rgb(buf, format.width, format.height, pixel_format)?;
    log::info!(
        "SnapshotSource: captured {}x{} from {}",
        width,
        height,
        device_path
    );
    Frame::from_rgb(pixels, width, height, 1)
}
