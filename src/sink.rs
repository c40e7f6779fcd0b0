//! Display targets for annotated frames.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::alert::LatchDecision;
use crate::detect::Detection;
use crate::frame::write_jpeg;
use crate::monitor::FrameOutcome;

pub const LATEST_FRAME_FILE: &str = "latest.jpg";
pub const DETECTIONS_LOG_FILE: &str = "detections.jsonl";

pub trait FrameSink {
    /// Present one annotated frame.
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()> {
        (**self).show(outcome)
    }
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _outcome: &FrameOutcome) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: u64,
    alert_condition: bool,
    target_count: usize,
    notified: bool,
    delivered: Option<bool>,
    detections: &'a [Detection],
}

/// Writes the most recent annotated frame to `latest.jpg` and one JSON line
/// per frame to `detections.jsonl`. With `keep_frames`, every frame is also
/// kept as `frame-NNNNNN.jpg`.
pub struct DirectorySink {
    dir: PathBuf,
    keep_frames: bool,
    log: BufWriter<File>,
}

impl DirectorySink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        let log_path = dir.join(DETECTIONS_LOG_FILE);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("open {}", log_path.display()))?;
        Ok(Self {
            dir,
            keep_frames: false,
            log: BufWriter::new(log),
        })
    }

    pub fn keep_frames(mut self, keep: bool) -> Self {
        self.keep_frames = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_image(&self, outcome: &FrameOutcome) -> Result<()> {
        // Write beside the target and rename so viewers never see a torn file.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("create temp frame in {}", self.dir.display()))?;
        write_jpeg(&outcome.image, tmp.as_file_mut())?;
        tmp.persist(self.dir.join(LATEST_FRAME_FILE))
            .context("replace latest frame")?;

        if self.keep_frames {
            let path = self.dir.join(format!("frame-{:06}.jpg", outcome.index));
            let mut file = BufWriter::new(
                File::create(&path).with_context(|| format!("create {}", path.display()))?,
            );
            write_jpeg(&outcome.image, &mut file)?;
            file.flush()?;
        }
        Ok(())
    }
}

impl FrameSink for DirectorySink {
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()> {
        self.write_image(outcome)?;

        let record = FrameRecord {
            frame: outcome.index,
            alert_condition: outcome.alert_condition,
            target_count: outcome.target_count,
            notified: outcome.decision == LatchDecision::Notify,
            delivered: outcome.delivery.as_ref().map(|delivery| delivery.is_sent()),
            detections: &outcome.detections,
        };
        serde_json::to_writer(&mut self.log, &record).context("encode frame record")?;
        self.log.write_all(b"\n")?;
        self.log.flush()?;
        Ok(())
    }
}
