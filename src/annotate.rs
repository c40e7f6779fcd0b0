//! Detection annotator.
//!
//! Normalizes a frame, runs the detector, keeps detections at or above the
//! confidence threshold, draws them, and reports whether the alert condition
//! (at least one target-class detection) holds for the frame.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::track::ByteTracker;

const LABEL_SCALE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

/// Box colours keyed by label category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub target: Rgb<u8>,
    pub other: Rgb<u8>,
}

/// Output of one annotated frame.
#[derive(Clone, Debug)]
pub struct Annotated {
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    pub target_count: usize,
    pub alert_condition: bool,
}

pub struct Annotator {
    resize_width: u32,
    confidence: f32,
    target_labels: Vec<String>,
    palette: Palette,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(resize_width: u32, confidence: f32, target_labels: Vec<String>, palette: Palette) -> Self {
        Self {
            resize_width,
            confidence,
            target_labels,
            palette,
            font: None,
        }
    }

    /// Draw label text with this font. Without one, labels are blank tags.
    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read label font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("invalid label font {}", path.display()))?;
        Ok(self.with_font(font))
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_target(&self, detection: &Detection) -> bool {
        self.target_labels
            .iter()
            .any(|label| detection.is_labelled(label))
    }

    /// Annotate one frame. Detector errors are returned unchanged.
    pub fn annotate<B: DetectorBackend + ?Sized>(
        &self,
        backend: &mut B,
        frame: &Frame,
    ) -> Result<Annotated> {
        self.annotate_tracked(backend, frame, None)
    }

    /// Annotate one frame, passing the kept detections through `tracker`
    /// before drawing so labels carry track ids.
    pub fn annotate_tracked<B: DetectorBackend + ?Sized>(
        &self,
        backend: &mut B,
        frame: &Frame,
        tracker: Option<&mut ByteTracker>,
    ) -> Result<Annotated> {
        let mut image = frame.normalized(self.resize_width);

        let mut detections: Vec<Detection> = backend
            .detect(&image, self.confidence)?
            .into_iter()
            .filter(|detection| detection.confidence >= self.confidence)
            .collect();
        if let Some(tracker) = tracker {
            tracker.update(&mut detections);
        }

        let mut target_count = 0;
        for detection in &detections {
            let color = if self.is_target(detection) {
                target_count += 1;
                self.palette.target
            } else {
                self.palette.other
            };
            self.draw_box_label(&mut image, detection, color);
        }

        Ok(Annotated {
            image,
            detections,
            target_count,
            alert_condition: target_count > 0,
        })
    }

    fn draw_box_label(&self, image: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let bbox = detection
            .bbox
            .clamped(image.width() as f32, image.height() as f32);
        let left = bbox.x1.round() as i32;
        let top = bbox.y1.round() as i32;
        let width = (bbox.width().round() as u32).max(1);
        let height = (bbox.height().round() as u32).max(1);

        for inset in 0..BOX_THICKNESS {
            let w = width.saturating_sub(2 * inset as u32).max(1);
            let h = height.saturating_sub(2 * inset as u32).max(1);
            draw_hollow_rect_mut(image, Rect::at(left + inset, top + inset).of_size(w, h), color);
        }

        let text = label_text(detection);
        let tag_height = LABEL_SCALE as i32 + 2 * LABEL_PADDING;
        let tag_width = (text.chars().count() as f32 * LABEL_SCALE * 0.6) as i32 + 2 * LABEL_PADDING;
        // Inside the box when there is no room above it.
        let tag_top = if top >= tag_height { top - tag_height } else { top };
        draw_filled_rect_mut(
            image,
            Rect::at(left, tag_top).of_size(tag_width as u32, tag_height as u32),
            color,
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                text_color(color),
                left + LABEL_PADDING,
                tag_top + LABEL_PADDING,
                PxScale::from(LABEL_SCALE),
                font,
                &text,
            );
        }
    }
}

fn label_text(detection: &Detection) -> String {
    match detection.track_id {
        Some(id) => format!("id:{} {} {:.2}", id, detection.label, detection.confidence),
        None => format!("{} {:.2}", detection.label, detection.confidence),
    }
}

/// Black or white, whichever reads better on `background`.
fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 128.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};

    const TARGET: Rgb<u8> = Rgb([255, 0, 0]);
    const OTHER: Rgb<u8> = Rgb([0, 255, 0]);

    fn annotator(confidence: f32) -> Annotator {
        Annotator::new(
            720,
            confidence,
            vec!["violence".into()],
            Palette {
                target: TARGET,
                other: OTHER,
            },
        )
    }

    fn det(label: &str, confidence: f32, x1: f32) -> Detection {
        Detection::new(0, label, confidence, BoundingBox::new(x1, 100.0, x1 + 80.0, 200.0))
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(1280, 720), 1)
    }

    #[test]
    fn target_detection_raises_condition_and_uses_target_color() -> Result<()> {
        let mut backend = StubBackend::new(vec!["violence".into()])
            .with_script(vec![vec![det("Violence", 0.9, 100.0)]]);
        let out = annotator(0.6).annotate(&mut backend, &frame())?;

        assert_eq!((out.image.width(), out.image.height()), (720, 405));
        assert_eq!(out.target_count, 1);
        assert!(out.alert_condition);
        // left edge of the box, below the label tag
        assert_eq!(out.image.get_pixel(100, 150), &TARGET);
        Ok(())
    }

    #[test]
    fn other_labels_are_drawn_but_do_not_alert() -> Result<()> {
        let mut backend = StubBackend::new(vec!["person".into()])
            .with_script(vec![vec![det("person", 0.9, 300.0)]]);
        let out = annotator(0.6).annotate(&mut backend, &frame())?;

        assert_eq!(out.detections.len(), 1);
        assert_eq!(out.target_count, 0);
        assert!(!out.alert_condition);
        assert_eq!(out.image.get_pixel(300, 150), &OTHER);
        Ok(())
    }

    #[test]
    fn below_threshold_detections_are_neither_drawn_nor_counted() -> Result<()> {
        let mut backend = StubBackend::new(vec!["violence".into()])
            .with_script(vec![vec![det("violence", 0.59, 100.0), det("violence", 0.6, 400.0)]]);
        let out = annotator(0.6).annotate(&mut backend, &frame())?;

        assert_eq!(out.detections.len(), 1);
        assert_eq!(out.detections[0].confidence, 0.6);
        assert_eq!(out.target_count, 1);
        assert_eq!(out.image.get_pixel(100, 150), &Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn detector_errors_propagate() {
        struct Broken;
        impl DetectorBackend for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn detect(&mut self, _: &RgbImage, _: f32) -> Result<Vec<Detection>> {
                anyhow::bail!("model exploded")
            }
            fn labels(&self) -> &[String] {
                &[]
            }
        }

        let err = annotator(0.5).annotate(&mut Broken, &frame()).unwrap_err();
        assert_eq!(err.to_string(), "model exploded");
    }

    #[test]
    fn tracked_detections_carry_ids_into_labels() -> Result<()> {
        let mut backend = StubBackend::new(vec!["violence".into()]).with_script(vec![
            vec![det("violence", 0.9, 100.0), det("violence", 0.3, 400.0)],
            vec![det("violence", 0.9, 104.0)],
        ]);
        let mut tracker = ByteTracker::new(crate::track::TrackerConfig::default());
        let annotator = annotator(0.6);

        let first = annotator.annotate_tracked(&mut backend, &frame(), Some(&mut tracker))?;
        assert_eq!(first.detections.len(), 1);
        assert_eq!(first.detections[0].track_id, Some(1));
        assert_eq!(label_text(&first.detections[0]), "id:1 violence 0.90");

        let second = annotator.annotate_tracked(&mut backend, &frame(), Some(&mut tracker))?;
        assert_eq!(second.detections[0].track_id, Some(1));
        assert!(second.alert_condition);
        Ok(())
    }

    #[test]
    fn text_color_contrasts_with_tag() {
        assert_eq!(text_color(Rgb([255, 255, 255])), Rgb([0, 0, 0]));
        assert_eq!(text_color(Rgb([0, 0, 128])), Rgb([255, 255, 255]));
    }
}
