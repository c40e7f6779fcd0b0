//! Frame loop: annotate, latch, notify, display.
//!
//! `MonitorSession` owns the detector, the annotator, the notifier and the
//! alert latch for one run. Stop and reset requests come in through
//! [`Controls`], which the caller shares with whatever reads operator input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use crate::alert::{AlertLatch, LatchDecision};
use crate::annotate::Annotator;
use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::notify::{dispatch_alert, AlertMessage, Delivery, Notifier};
use crate::sink::FrameSink;
use crate::task::Task;
use crate::track::ByteTracker;

/// Operator requests shared between the loop and input handlers.
#[derive(Clone, Debug, Default)]
pub struct Controls {
    stop: Arc<AtomicBool>,
    reset: Arc<AtomicBool>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Ask for the alert latch to be cleared before the next frame.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Consume a pending reset request.
    pub fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::SeqCst)
    }
}

/// Everything known about one processed frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub index: u64,
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    pub target_count: usize,
    pub alert_condition: bool,
    pub decision: LatchDecision,
    /// Set only on frames where a notification was attempted.
    pub delivery: Option<Delivery>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEnd {
    /// Source reported end of stream.
    Exhausted,
    /// Operator asked to stop.
    Stopped,
    /// Playback ended after the alert fired.
    StoppedOnAlert,
    /// Source failed to open or read.
    SourceFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub end: RunEnd,
}

pub struct MonitorSession<B, N> {
    annotator: Annotator,
    backend: B,
    notifier: N,
    latch: AlertLatch,
    recipient: String,
    message: AlertMessage,
    banner: String,
    stop_on_alert: bool,
    tracker: Option<ByteTracker>,
}

impl<B: DetectorBackend, N: Notifier> MonitorSession<B, N> {
    pub fn new(
        annotator: Annotator,
        backend: B,
        notifier: N,
        recipient: impl Into<String>,
        message: AlertMessage,
    ) -> Self {
        Self {
            annotator,
            backend,
            notifier,
            latch: AlertLatch::new(),
            recipient: recipient.into(),
            message,
            banner: "alert condition raised".to_string(),
            stop_on_alert: false,
            tracker: None,
        }
    }

    /// Use the alert message and alarm banner of `task`.
    pub fn for_task(annotator: Annotator, backend: B, notifier: N, recipient: impl Into<String>, task: Task) -> Self {
        Self::new(annotator, backend, notifier, recipient, task.alert_message())
            .with_banner(task.alarm_banner())
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// End the run once a notification has been attempted.
    pub fn with_stop_on_alert(mut self, stop_on_alert: bool) -> Self {
        self.stop_on_alert = stop_on_alert;
        self
    }

    /// Give detections stable ids across frames.
    pub fn with_tracker(mut self, tracker: Option<ByteTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Process one frame.
    ///
    /// `reset_requested` clears the latch before this frame is evaluated.
    /// Detector errors are returned; notification failures are reported in
    /// the outcome and the latch stays alerted.
    pub fn process_frame(&mut self, frame: &Frame, reset_requested: bool) -> Result<FrameOutcome> {
        if reset_requested {
            self.latch.reset();
        }

        let annotated =
            self.annotator
                .annotate_tracked(&mut self.backend, frame, self.tracker.as_mut())?;
        let decision = self.latch.observe(annotated.alert_condition);

        let delivery = match decision {
            LatchDecision::Notify => {
                log::error!("{} (frame {})", self.banner, frame.index());
                let delivery = dispatch_alert(
                    &mut self.notifier,
                    &self.recipient,
                    &self.message,
                    &annotated.image,
                );
                match &delivery {
                    Delivery::Sent => log::info!(
                        "alert notification delivered via {} to {}",
                        self.notifier.name(),
                        self.recipient
                    ),
                    Delivery::Failed(reason) => log::warn!(
                        "alert notification via {} failed: {}",
                        self.notifier.name(),
                        reason
                    ),
                }
                Some(delivery)
            }
            LatchDecision::Hold | LatchDecision::Quiet => None,
        };

        Ok(FrameOutcome {
            index: frame.index(),
            image: annotated.image,
            detections: annotated.detections,
            target_count: annotated.target_count,
            alert_condition: annotated.alert_condition,
            decision,
            delivery,
        })
    }

    /// Pull frames from `source` until it ends, the operator stops the run,
    /// or the alert fires with stop-on-alert set.
    ///
    /// The source must already be connected.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        controls: &Controls,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            frames_processed: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            end: RunEnd::Exhausted,
        };

        loop {
            if controls.stop_requested() {
                summary.end = RunEnd::Stopped;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("{} stopped delivering frames: {:#}", source.describe(), err);
                    summary.end = RunEnd::SourceFailed(format!("{:#}", err));
                    break;
                }
            };

            let outcome = self.process_frame(&frame, controls.take_reset())?;
            summary.frames_processed += 1;
            match &outcome.delivery {
                Some(Delivery::Sent) => summary.notifications_sent += 1,
                Some(Delivery::Failed(_)) => summary.notifications_failed += 1,
                None => {}
            }

            if let Err(err) = sink.show(&outcome) {
                log::warn!("frame {} not displayed: {:#}", outcome.index, err);
            }

            if summary.frames_processed % 100 == 0 {
                let stats = source.stats();
                log::info!(
                    "source health={} frames={} location={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.location
                );
            }

            if self.stop_on_alert && outcome.delivery.is_some() {
                summary.end = RunEnd::StoppedOnAlert;
                break;
            }
        }

        log::info!(
            "monitor finished after {} frame(s): {:?}",
            summary.frames_processed,
            summary.end
        );
        Ok(summary)
    }

    pub fn tracker(&self) -> Option<&ByteTracker> {
        self.tracker.as_ref()
    }

    pub fn latch(&self) -> &AlertLatch {
        &self.latch
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LatchState;
    use crate::annotate::Palette;
    use crate::detect::{BoundingBox, StubBackend};
    use crate::notify::LogNotifier;
    use image::Rgb;

    fn session(script: Vec<Vec<Detection>>) -> MonitorSession<StubBackend, LogNotifier> {
        let annotator = Annotator::new(
            320,
            0.5,
            vec!["student".into()],
            Palette {
                target: Rgb([100, 200, 255]),
                other: Rgb([0, 0, 128]),
            },
        );
        let backend = StubBackend::new(vec!["student".into()]).with_script(script);
        MonitorSession::for_task(annotator, backend, LogNotifier::new(), "ops@example.com", Task::Student)
    }

    fn student() -> Vec<Detection> {
        vec![Detection::new(0, "student", 0.9, BoundingBox::new(10.0, 40.0, 60.0, 120.0))]
    }

    #[test]
    fn reset_flag_rearms_before_evaluating_frame() -> Result<()> {
        let mut session = session(vec![student(), student(), student()]);
        let frame = Frame::new(RgbImage::new(64, 36), 1);

        let first = session.process_frame(&frame, false)?;
        assert_eq!(first.decision, LatchDecision::Notify);
        assert_eq!(first.delivery, Some(Delivery::Sent));

        let second = session.process_frame(&frame, false)?;
        assert_eq!(second.decision, LatchDecision::Hold);
        assert!(second.delivery.is_none());

        let third = session.process_frame(&frame, true)?;
        assert_eq!(third.decision, LatchDecision::Notify);
        assert_eq!(session.notifier().sent(), 2);
        assert_eq!(session.latch().state(), LatchState::Alerted);
        Ok(())
    }

    #[test]
    fn controls_reset_is_consumed_once() {
        let controls = Controls::new();
        assert!(!controls.take_reset());
        controls.request_reset();
        assert!(controls.take_reset());
        assert!(!controls.take_reset());
        controls.clone().request_stop();
        assert!(controls.stop_requested());
    }
}
