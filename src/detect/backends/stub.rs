use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Scripted backend for demos and tests.
///
/// Call `n` returns `script[n]` exactly as written; once the script runs out
/// every call returns no detections. The confidence threshold is not applied.
pub struct StubBackend {
    labels: Vec<String>,
    script: Vec<Vec<Detection>>,
    calls: usize,
}

impl StubBackend {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            script: Vec::new(),
            calls: 0,
        }
    }

    pub fn with_script(mut self, script: Vec<Vec<Detection>>) -> Self {
        self.script = script;
        self
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &RgbImage, _confidence: f32) -> Result<Vec<Detection>> {
        let detections = self.script.get(self.calls).cloned().unwrap_or_default();
        self.calls += 1;
        Ok(detections)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn stub_backend_replays_script_then_goes_quiet() {
        let student = Detection::new(0, "student", 0.8, BoundingBox::new(1.0, 1.0, 5.0, 5.0));
        let mut backend = StubBackend::new(vec!["student".into()])
            .with_script(vec![vec![], vec![student.clone()]]);
        let frame = RgbImage::new(8, 8);

        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        assert_eq!(backend.detect(&frame, 0.5).unwrap(), vec![student]);
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
    }
}
