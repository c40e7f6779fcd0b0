use std::path::PathBuf;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use busguard::detect::{BoundingBox, Detection, StubBackend};
use busguard::ingest::{open_source, FrameSource, IngestSettings, SourceSpec, SourceStats};
use busguard::monitor::{Controls, FrameOutcome, MonitorSession, RunEnd};
use busguard::notify::{AlertMessage, Delivery, Notification, Notifier};
use busguard::sink::{FrameSink, NullSink};
use busguard::{Annotator, Frame, LatchDecision, Palette, Task, TrackerKind};

/// Records every send; answers with `outcome`.
struct Recorder {
    outcome: Delivery,
    sends: Vec<Sent>,
}

struct Sent {
    attachment: PathBuf,
    existed_during_send: bool,
}

impl Recorder {
    fn new(outcome: Delivery) -> Self {
        Self {
            outcome,
            sends: Vec::new(),
        }
    }
}

impl Notifier for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn send(&mut self, notification: &Notification) -> Delivery {
        let attachment = notification.attachment.clone().expect("attachment");
        self.sends.push(Sent {
            existed_during_send: attachment.exists(),
            attachment,
        });
        self.outcome.clone()
    }
}

/// Remembers which frames notified and the track ids seen on each frame;
/// optionally asks for a reset after a frame.
struct Watch {
    notified_frames: Vec<u64>,
    track_ids: Vec<Vec<Option<u64>>>,
    reset_after: Option<(u64, Controls)>,
}

impl Watch {
    fn new() -> Self {
        Self {
            notified_frames: Vec::new(),
            track_ids: Vec::new(),
            reset_after: None,
        }
    }
}

impl FrameSink for Watch {
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()> {
        if outcome.decision == LatchDecision::Notify {
            self.notified_frames.push(outcome.index);
        }
        self.track_ids
            .push(outcome.detections.iter().map(|d| d.track_id).collect());
        if let Some((index, controls)) = &self.reset_after {
            if *index == outcome.index {
                controls.request_reset();
            }
        }
        Ok(())
    }
}

/// Sink that fails on every frame.
struct BrokenSink {
    calls: u64,
}

impl FrameSink for BrokenSink {
    fn show(&mut self, _outcome: &FrameOutcome) -> Result<()> {
        self.calls += 1;
        Err(anyhow!("display disconnected"))
    }
}

/// Yields `good` frames, then fails every read.
struct StallingSource {
    good: u64,
    served: u64,
}

impl FrameSource for StallingSource {
    fn describe(&self) -> String {
        "stalling test source".into()
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.served == self.good {
            return Err(anyhow!("stream stalled"));
        }
        self.served += 1;
        Ok(Some(Frame::new(RgbImage::new(64, 36), self.served)))
    }

    fn is_healthy(&self) -> bool {
        self.served < self.good
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.served,
            location: "test".into(),
        }
    }
}

fn student(confidence: f32) -> Detection {
    Detection::new(0, "student", confidence, BoundingBox::new(50.0, 60.0, 150.0, 200.0))
}

fn script(frames: u64, present: impl Fn(u64) -> bool) -> Vec<Vec<Detection>> {
    (1..=frames)
        .map(|index| if present(index) { vec![student(0.9)] } else { Vec::new() })
        .collect()
}

fn session<N: Notifier>(
    script: Vec<Vec<Detection>>,
    notifier: N,
) -> MonitorSession<StubBackend, N> {
    let annotator = Annotator::new(
        320,
        0.5,
        vec!["student".into()],
        Palette {
            target: Rgb([100, 200, 255]),
            other: Rgb([0, 0, 128]),
        },
    );
    MonitorSession::new(
        annotator,
        StubBackend::new(vec!["student".into()]).with_script(script),
        notifier,
        "ops@example.com",
        AlertMessage {
            subject: "student detected".into(),
            body: "check the bus".into(),
        },
    )
}

fn run<N: Notifier>(
    session: &mut MonitorSession<StubBackend, N>,
    frames: u64,
    sink: &mut dyn FrameSink,
    controls: &Controls,
) -> Result<busguard::RunSummary> {
    let mut source = open_source(
        &SourceSpec::Video(format!("stub://bus?frames={frames}")),
        &IngestSettings::default(),
    )?;
    source.connect()?;
    session.run(source.as_mut(), sink, controls)
}

#[test]
fn no_targets_never_notify() -> Result<()> {
    let other = Detection::new(1, "person", 0.95, BoundingBox::new(0.0, 0.0, 40.0, 40.0));
    let mut session = session(vec![vec![other]; 20], Recorder::new(Delivery::Sent));
    let summary = run(&mut session, 20, &mut NullSink, &Controls::new())?;

    assert_eq!(summary.frames_processed, 20);
    assert_eq!(summary.end, RunEnd::Exhausted);
    assert!(session.notifier().sends.is_empty());
    Ok(())
}

#[test]
fn target_in_frames_three_to_ten_notifies_once_at_frame_three() -> Result<()> {
    let mut session = session(script(10, |i| i >= 3), Recorder::new(Delivery::Sent));
    let mut watch = Watch::new();
    let summary = run(&mut session, 10, &mut watch, &Controls::new())?;

    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(watch.notified_frames, vec![3]);
    assert_eq!(session.notifier().sends.len(), 1);
    Ok(())
}

#[test]
fn condition_dropping_out_does_not_rearm() -> Result<()> {
    let mut session = session(script(12, |i| i % 3 == 0), Recorder::new(Delivery::Sent));
    let mut watch = Watch::new();
    run(&mut session, 12, &mut watch, &Controls::new())?;

    assert_eq!(watch.notified_frames, vec![3]);
    Ok(())
}

#[test]
fn reset_allows_exactly_one_more_notification() -> Result<()> {
    let controls = Controls::new();
    let mut session = session(script(10, |i| i >= 2), Recorder::new(Delivery::Sent));
    let mut watch = Watch::new();
    watch.reset_after = Some((5, controls.clone()));
    let summary = run(&mut session, 10, &mut watch, &controls)?;

    assert_eq!(watch.notified_frames, vec![2, 6]);
    assert_eq!(summary.notifications_sent, 2);
    assert_eq!(session.latch().resets(), 1);
    Ok(())
}

#[test]
fn below_threshold_targets_do_not_alert() -> Result<()> {
    let mut session = session(vec![vec![student(0.49)]; 5], Recorder::new(Delivery::Sent));
    let summary = run(&mut session, 5, &mut NullSink, &Controls::new())?;

    assert_eq!(summary.notifications_sent, 0);
    assert!(session.notifier().sends.is_empty());
    Ok(())
}

#[test]
fn failed_send_keeps_the_loop_running() -> Result<()> {
    let mut session = session(
        script(10, |i| i >= 3),
        Recorder::new(Delivery::Failed("connection refused".into())),
    );
    let summary = run(&mut session, 10, &mut NullSink, &Controls::new())?;

    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.notifications_failed, 1);
    assert_eq!(summary.notifications_sent, 0);
    // no retry within the episode
    assert_eq!(session.notifier().sends.len(), 1);
    assert!(session.latch().is_alerted());
    Ok(())
}

#[test]
fn attachment_is_gone_after_send_returns() -> Result<()> {
    for outcome in [Delivery::Sent, Delivery::Failed("smtp down".into())] {
        let controls = Controls::new();
        let mut session = session(script(6, |i| i >= 2), Recorder::new(outcome));
        let mut watch = Watch::new();
        watch.reset_after = Some((3, controls.clone()));
        run(&mut session, 6, &mut watch, &controls)?;

        let sends = &session.notifier().sends;
        assert_eq!(sends.len(), 2);
        for sent in sends {
            assert!(sent.existed_during_send);
            assert!(!sent.attachment.exists());
        }
    }
    Ok(())
}

#[test]
fn stop_on_alert_ends_playback() -> Result<()> {
    let mut session = session(script(10, |i| i >= 4), Recorder::new(Delivery::Sent))
        .with_stop_on_alert(true);
    let summary = run(&mut session, 10, &mut NullSink, &Controls::new())?;

    assert_eq!(summary.end, RunEnd::StoppedOnAlert);
    assert_eq!(summary.frames_processed, 4);
    Ok(())
}

#[test]
fn stop_request_ends_run_before_next_frame() -> Result<()> {
    let controls = Controls::new();
    controls.request_stop();
    let mut session = session(script(5, |_| true), Recorder::new(Delivery::Sent));
    let summary = run(&mut session, 5, &mut NullSink, &controls)?;

    assert_eq!(summary.end, RunEnd::Stopped);
    assert_eq!(summary.frames_processed, 0);
    Ok(())
}

#[test]
fn task_presets_drive_the_session() -> Result<()> {
    let task = Task::Violence;
    let annotator = Annotator::new(
        320,
        task.default_confidence(),
        task.default_target_labels(),
        task.palette(),
    );
    let violence = Detection::new(1, "Violence", 0.8, BoundingBox::new(10.0, 30.0, 90.0, 150.0));
    let calm = Detection::new(0, "NonViolence", 0.95, BoundingBox::new(100.0, 30.0, 200.0, 150.0));
    let backend = StubBackend::new(task.default_labels())
        .with_script(vec![vec![calm.clone()], vec![calm, violence]]);
    let mut session = MonitorSession::for_task(
        annotator,
        backend,
        Recorder::new(Delivery::Sent),
        "ops@example.com",
        task,
    );
    let summary = run(&mut session, 3, &mut NullSink, &Controls::new())?;

    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(session.notifier().sends.len(), 1);
    Ok(())
}

#[test]
fn source_failure_ends_run_with_frames_counted() -> Result<()> {
    let mut session = session(script(5, |i| i >= 2), Recorder::new(Delivery::Sent));
    let mut source = StallingSource { good: 2, served: 0 };
    let mut watch = Watch::new();
    let summary = session.run(&mut source, &mut watch, &Controls::new())?;

    assert_eq!(summary.frames_processed, 2);
    match &summary.end {
        RunEnd::SourceFailed(reason) => assert!(reason.contains("stream stalled"), "{reason}"),
        other => panic!("unexpected end {other:?}"),
    }
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(watch.notified_frames, vec![2]);
    Ok(())
}

#[test]
fn failing_sink_does_not_stop_the_loop() -> Result<()> {
    let mut session = session(script(8, |i| i >= 3), Recorder::new(Delivery::Sent));
    let mut sink = BrokenSink { calls: 0 };
    let summary = run(&mut session, 8, &mut sink, &Controls::new())?;

    assert_eq!(summary.end, RunEnd::Exhausted);
    assert_eq!(summary.frames_processed, 8);
    assert_eq!(sink.calls, 8);
    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(session.notifier().sends.len(), 1);
    Ok(())
}

#[test]
fn tracking_labels_detections_without_changing_alerts() -> Result<()> {
    let mut session = session(script(10, |i| i >= 3), Recorder::new(Delivery::Sent))
        .with_tracker(TrackerKind::ByteTrack.build(10));
    let mut watch = Watch::new();
    let summary = run(&mut session, 10, &mut watch, &Controls::new())?;

    assert_eq!(summary.notifications_sent, 1);
    assert_eq!(watch.notified_frames, vec![3]);
    // first sighting is tentative, then the object keeps one id
    assert_eq!(watch.track_ids[2], vec![None]);
    for ids in &watch.track_ids[3..] {
        assert_eq!(ids, &vec![Some(1)]);
    }
    let tracker = session.tracker().expect("tracker installed");
    assert_eq!(tracker.frame(), 10);
    assert_eq!(tracker.active_tracks(), 1);
    Ok(())
}
