//! Bus safety monitor.
//!
//! Watches a video source (stored clip, webcam snapshot, or RTSP stream),
//! runs an object detector on every frame, draws the detections, and sends
//! one e-mail alert with the annotated frame attached the first time a target
//! class shows up. The alert stays latched until an operator resets it.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames, normalization, JPEG encoding
//! - `ingest`: frame sources (video files, webcam snapshots, RTSP)
//! - `detect`: detector backends (tract ONNX, scripted stub) and results
//! - `annotate`: thresholding, drawing, per-frame alert condition
//! - `alert`: the one-shot alert latch
//! - `notify`: notifiers (SMTP, log) and attachment handling
//! - `monitor`: the frame loop tying the above together
//! - `sink`: where annotated frames go
//! - `task`: violence / student presets
//! - `track`: ByteTrack identities across frames
//! - `config`: file + environment configuration

pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod sink;
pub mod task;
pub mod track;
pub mod ui;

pub use alert::{AlertLatch, LatchDecision, LatchState};
pub use annotate::{Annotated, Annotator, Palette};
pub use config::{MonitorConfig, SmtpSettings, TaskSettings};
pub use detect::{build_backend, BoundingBox, Detection, DetectorBackend, StubBackend};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, IngestSettings, SourceSpec};
pub use monitor::{Controls, FrameOutcome, MonitorSession, RunEnd, RunSummary};
pub use notify::{dispatch_alert, AlertMessage, Delivery, LogNotifier, Notification, Notifier};
pub use sink::{DirectorySink, FrameSink, NullSink};
pub use task::Task;
pub use track::{ByteTracker, TrackerConfig, TrackerKind};
