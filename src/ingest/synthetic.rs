use anyhow::{anyhow, Result};

use super::SourceStats;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Synthetic frame generator behind `stub://` locations.
pub(crate) struct SyntheticSource {
    location: String,
    width: u32,
    height: u32,
    limit: Option<u64>,
    frame_count: u64,
}

impl SyntheticSource {
    /// Parse `stub://name[?frames=N]`. `default_limit` applies when no
    /// `frames` parameter is given.
    pub(crate) fn parse(location: &str, default_limit: Option<u64>) -> Result<Self> {
        let rest = location
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source needs a stub:// location"))?;
        let mut limit = default_limit;
        if let Some((_, query)) = rest.split_once('?') {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("frames", n)) => {
                        limit = Some(n.parse().map_err(|_| {
                            anyhow!("stub frames parameter must be an integer, got '{}'", n)
                        })?);
                    }
                    _ => return Err(anyhow!("unsupported stub parameter '{}'", pair)),
                }
            }
        }
        Ok(Self {
            location: location.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            limit,
            frame_count: 0,
        })
    }

    pub(crate) fn connect(&mut self, kind: &str) -> Result<()> {
        log::info!("{}: connected to {} (synthetic)", kind, self.location);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::from_rgb(pixels, self.width, self.height, self.frame_count).map(Some)
    }

    /// A diagonal gradient that shifts by one step per frame.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count) % 256) as u8;
        }
        pixels
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            location: self.location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_stub_ends_after_limit() -> Result<()> {
        let mut source = SyntheticSource::parse("stub://clip?frames=2", None)?;
        assert_eq!(source.next_frame()?.map(|f| f.index()), Some(1));
        assert_eq!(source.next_frame()?.map(|f| f.index()), Some(2));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn unbounded_stub_keeps_going() -> Result<()> {
        let mut source = SyntheticSource::parse("stub://bus", None)?;
        for _ in 0..5 {
            let frame = source.next_frame()?.expect("frame");
            assert_eq!((frame.width(), frame.height()), (640, 480));
        }
        Ok(())
    }

    #[test]
    fn rejects_unknown_parameters() {
        assert!(SyntheticSource::parse("stub://bus?fps=3", None).is_err());
        assert!(SyntheticSource::parse("stub://bus?frames=x", None).is_err());
    }
}
