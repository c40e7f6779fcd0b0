#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{non_max_suppression, BoundingBox, Detection};

/// Square input edge of the exported YOLOv8 graph.
const INPUT_SIZE: u32 = 640;
/// Box offset inside a YOLOv8 prediction column (cx, cy, w, h).
const CXYWH_OFFSET: usize = 4;
const DEFAULT_IOU: f32 = 0.7;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Expects the standard detection head `[1, 4 + classes, anchors]`. The frame
/// is stretched to the square model input and boxes are scaled back, so
/// results are in the caller's frame coordinates.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Vec<String>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        if labels.is_empty() {
            return Err(anyhow!("model {} needs at least one class label", model_path.display()));
        }

        Ok(Self {
            model,
            labels,
            iou_threshold: DEFAULT_IOU,
        })
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let size = INPUT_SIZE as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        confidence: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let classes = shape[1] - CXYWH_OFFSET;
        let anchors = shape[2];

        let sx = frame_width as f32 / INPUT_SIZE as f32;
        let sy = frame_height as f32 / INPUT_SIZE as f32;

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let mut best = (0usize, f32::NEG_INFINITY);
            for class in 0..classes {
                let score = preds[[0, CXYWH_OFFSET + class, anchor]];
                if score > best.1 {
                    best = (class, score);
                }
            }
            let (class_id, score) = best;
            if score < confidence {
                continue;
            }

            let bbox = BoundingBox::from_center(
                preds[[0, 0, anchor]],
                preds[[0, 1, anchor]],
                preds[[0, 2, anchor]],
                preds[[0, 3, anchor]],
            )
            .scaled(sx, sy)
            .clamped(frame_width as f32, frame_height as f32);

            let label = self
                .labels
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", class_id));
            detections.push(Detection::new(class_id, label, score, bbox));
        }

        non_max_suppression(&mut detections, self.iou_threshold);
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, confidence, frame.width(), frame.height())
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(INPUT_SIZE, INPUT_SIZE);
        self.detect(&blank, 1.0).map(|_| ())
    }
}
