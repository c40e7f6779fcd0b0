use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object-detection model provider.
///
/// Backends receive a normalized RGB frame and return every region scoring at
/// least `confidence`, in the frame's pixel coordinates. Overlap suppression,
/// if any, is the backend's business; callers render the set as returned.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Errors are returned to the caller unchanged. Backends must not retry.
    fn detect(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>>;

    /// Class names indexed by class id.
    fn labels(&self) -> &[String];

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>> {
        (**self).detect(frame, confidence)
    }

    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
