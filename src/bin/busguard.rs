//! busguard - watch a bus camera and e-mail an alert when a target appears
//!
//! Operator controls while running: type `r` + Enter to reset the alarm,
//! `q` + Enter (or Ctrl-C) to stop.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;

use busguard::detect::build_backend;
use busguard::ingest::open_source;
use busguard::monitor::{Controls, FrameOutcome, MonitorSession, RunEnd};
use busguard::notify::build_notifier;
use busguard::sink::{DirectorySink, FrameSink, NullSink};
use busguard::ui::Ui;
use busguard::{Annotator, Detection, DetectorBackend, MonitorConfig, SourceSpec, Task, TrackerKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Video,
    Webcam,
    Rtsp,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detection task (violence or student). Overrides the config file.
    #[arg(long)]
    task: Option<Task>,
    /// Where frames come from.
    #[arg(long, value_enum, default_value_t = SourceKind::Video)]
    source: SourceKind,
    /// Catalogued video name (see --list-videos).
    #[arg(long, default_value = "video_1")]
    video: String,
    /// Video file path; takes precedence over --video.
    #[arg(long)]
    path: Option<String>,
    /// RTSP stream URL.
    #[arg(long, env = "BUSGUARD_RTSP_URL")]
    url: Option<String>,
    /// Webcam device node or captured image file.
    #[arg(long, default_value = "/dev/video0")]
    device: String,
    /// Confidence threshold override for the selected task.
    #[arg(long)]
    confidence: Option<f32>,
    /// Alert recipient override.
    #[arg(long)]
    recipient: Option<String>,
    /// Directory for annotated frames and the detection log.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Keep every annotated frame in --out, not only the latest.
    #[arg(long)]
    keep_frames: bool,
    /// Log alerts instead of sending e-mail.
    #[arg(long)]
    dry_run: bool,
    /// End stored-video playback once the alert fires.
    #[arg(long)]
    stop_on_alert: bool,
    /// Print the video catalogue for the task and exit.
    #[arg(long)]
    list_videos: bool,
    /// Object tracker for video and RTSP sources: none or bytetrack.
    #[arg(long)]
    tracker: Option<TrackerKind>,
    /// Progress output: auto, plain, or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = MonitorConfig::load_with(args.task, |cfg| {
        if let Some(recipient) = &args.recipient {
            cfg.recipient = recipient.clone();
        }
        if let Some(confidence) = args.confidence {
            let task = cfg.task;
            cfg.task_settings_mut(task).confidence = confidence;
        }
        if let Some(out) = &args.out {
            cfg.output_dir = Some(out.clone());
        }
        if let Some(tracker) = args.tracker {
            cfg.tracker = tracker;
        }
        Ok(())
    })?;
    let task = cfg.task;
    let settings = cfg.active();

    if args.list_videos {
        for (name, path) in &settings.videos {
            println!("{name}\t{path}");
        }
        return Ok(());
    }

    let spec = match args.source {
        SourceKind::Video => SourceSpec::Video(match &args.path {
            Some(path) => path.clone(),
            None => settings.video(&args.video)?.to_string(),
        }),
        SourceKind::Webcam => SourceSpec::Webcam(args.device.clone()),
        SourceKind::Rtsp => SourceSpec::Rtsp(
            args.url
                .clone()
                .ok_or_else(|| anyhow!("--source rtsp needs --url or BUSGUARD_RTSP_URL"))?,
        ),
    };

    let ui = Ui::from_flag(args.ui.as_deref());

    let backend = {
        let _stage = ui.stage("Loading detector");
        let mut backend = build_backend(&cfg.backend, &settings.model_path, &settings.labels)
            .with_context(|| format!("load {} model {}", task, settings.model_path.display()))?;
        backend.warm_up()?;
        backend
    };
    log::info!(
        "{} detector ready: backend={} model={} confidence={:.2} targets={:?}",
        task,
        backend.name(),
        settings.model_path.display(),
        settings.confidence,
        settings.target_labels
    );

    let mut annotator = Annotator::new(
        cfg.resize_width,
        settings.confidence,
        settings.target_labels.clone(),
        task.palette(),
    );
    if let Some(font_path) = &cfg.font_path {
        annotator = annotator.with_font_file(font_path)?;
    }

    let notifier = build_notifier(&cfg.smtp, &cfg.recipient, args.dry_run)?;
    let stop_on_alert =
        matches!(spec, SourceSpec::Video(_)) && (args.stop_on_alert || settings.stop_on_alert);

    // A single snapshot has nothing to track across.
    let tracker = match spec {
        SourceSpec::Webcam(_) => None,
        _ => cfg.tracker.build(cfg.ingest.target_fps),
    };
    if tracker.is_some() {
        log::info!("tracking objects with {}", cfg.tracker);
    }

    let mut source = open_source(&spec, &cfg.ingest)?;
    {
        let _stage = ui.stage("Connecting to source");
        source
            .connect()
            .with_context(|| format!("connect {}", source.describe()))?;
    }
    log::info!("watching {}", source.describe());

    let controls = Controls::new();
    install_controls(&controls);

    let inner: Box<dyn FrameSink> = match &cfg.output_dir {
        Some(dir) => {
            let sink = DirectorySink::create(dir)?.keep_frames(args.keep_frames);
            log::info!("annotated frames written to {}", sink.dir().display());
            Box::new(sink)
        }
        None => Box::new(NullSink),
    };
    let mut sink = ui.frame_counter(LastFrame::new(inner));

    let mut session = MonitorSession::for_task(
        annotator,
        backend,
        notifier,
        cfg.recipient.clone(),
        task,
    )
    .with_stop_on_alert(stop_on_alert)
    .with_tracker(tracker);
    let summary = session.run(source.as_mut(), &mut sink, &controls)?;
    let last = sink.into_inner();

    if matches!(spec, SourceSpec::Webcam(_)) {
        report_snapshot(last.detections());
    }

    log::info!(
        "processed {} frame(s); notifications sent={} failed={}",
        summary.frames_processed,
        summary.notifications_sent,
        summary.notifications_failed
    );
    match summary.end {
        RunEnd::SourceFailed(reason) => Err(anyhow!("source failed: {}", reason)),
        _ => Ok(()),
    }
}

/// Ctrl-C stops; stdin lines `r` and `q` reset and stop.
fn install_controls(controls: &Controls) {
    let handler_controls = controls.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_controls.request_stop()) {
        log::warn!("failed to install Ctrl-C handler: {}", err);
    }

    let input_controls = controls.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "r" | "R" => {
                    log::info!("alarm reset requested");
                    input_controls.request_reset();
                }
                "q" | "Q" => {
                    input_controls.request_stop();
                    break;
                }
                "" => {}
                other => log::warn!("unknown command {:?}; use r (reset) or q (quit)", other),
            }
        }
    });
    log::info!("controls: r + Enter resets the alarm, q + Enter or Ctrl-C quits");
}

/// Keeps the detections of the most recent frame.
struct LastFrame {
    inner: Box<dyn FrameSink>,
    detections: Vec<Detection>,
}

impl LastFrame {
    fn new(inner: Box<dyn FrameSink>) -> Self {
        Self {
            inner,
            detections: Vec::new(),
        }
    }

    fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

impl FrameSink for LastFrame {
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()> {
        self.detections = outcome.detections.clone();
        self.inner.show(outcome)
    }
}

fn report_snapshot(detections: &[Detection]) {
    if detections.is_empty() {
        println!("no detections in snapshot");
        return;
    }
    for detection in detections {
        println!(
            "{}\t{:.2}\t[{:.0}, {:.0}, {:.0}, {:.0}]",
            detection.label,
            detection.confidence,
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2
        );
    }
}
