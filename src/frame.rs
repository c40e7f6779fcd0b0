//! Frame container.
//!
//! Every source hands the monitor a `Frame`: an RGB8 pixel buffer (channel order
//! R, G, B, row-major, no padding) plus the index the source assigned to it.
//! Frames are ephemeral; the monitor processes one at a time and drops it.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

/// Default width frames are normalized to before inference.
pub const DEFAULT_RESIZE_WIDTH: u32 = 720;

/// Smallest accepted normalization width.
pub const MIN_RESIZE_WIDTH: u32 = 16;

/// JPEG quality for alert attachments and the frame sink.
pub const JPEG_QUALITY: u8 = 90;

/// One decoded video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Wrap tightly packed RGB24 pixels.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to build {}x{} RGB image", width, height))?;
        Ok(Self { image, index })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Resize to `width` with a 16:9 height, regardless of the source aspect.
    pub fn normalized(&self, width: u32) -> RgbImage {
        let (width, height) = normalized_dimensions(width);
        if self.image.width() == width && self.image.height() == height {
            return self.image.clone();
        }
        image::imageops::resize(&self.image, width, height, FilterType::Triangle)
    }
}

/// Target dimensions for a normalized frame: `width` x `width * 9 / 16`.
/// Widths under [`MIN_RESIZE_WIDTH`] are raised to it; configuration rejects
/// them up front.
pub fn normalized_dimensions(width: u32) -> (u32, u32) {
    let width = width.max(MIN_RESIZE_WIDTH);
    (width, width * 9 / 16)
}

/// Copy `height` rows of packed RGB8 out of a decoder buffer whose rows are
/// `stride` bytes apart. Buffers too short for the frame are an error.
pub fn pack_rgb_rows(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let row_bytes = width as usize * 3;
    let height = height as usize;
    if stride < row_bytes {
        return Err(anyhow!(
            "row stride {} is shorter than a {}-pixel RGB row",
            stride,
            width
        ));
    }

    if stride == row_bytes {
        let total = row_bytes * height;
        let pixels = data.get(..total).with_context(|| {
            format!("buffer shorter than frame: {} of {} bytes", data.len(), total)
        })?;
        return Ok(pixels.to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        let bytes = data
            .get(start..start + row_bytes)
            .with_context(|| format!("buffer shorter than frame at row {}", row))?;
        pixels.extend_from_slice(bytes);
    }
    Ok(pixels)
}

/// Encode an RGB image as JPEG into `writer`.
pub fn write_jpeg<W: Write>(image: &RgbImage, writer: &mut W) -> Result<()> {
    let mut encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
    encoder.encode_image(image).context("encode frame as JPEG")?;
    Ok(())
}
