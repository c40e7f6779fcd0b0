//! demo - end-to-end synthetic run of the bus monitor
//!
//! Feeds synthetic frames through a scripted detector and a logging notifier,
//! so the latch behaviour can be watched without a model, a camera, or a mail
//! server.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use busguard::detect::{BoundingBox, Detection, StubBackend};
use busguard::ingest::{open_source, IngestSettings, SourceSpec};
use busguard::monitor::MonitorSession;
use busguard::notify::LogNotifier;
use busguard::sink::{DirectorySink, FrameSink, NullSink};
use busguard::ui::Ui;
use busguard::{Annotator, Task, TrackerKind};

const DEMO_RECIPIENT: &str = "operator@example.invalid";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Task preset to demonstrate.
    #[arg(long, default_value = "student")]
    task: Task,
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 10)]
    frames: u64,
    /// First frame (1-based) on which a target is detected.
    #[arg(long, default_value_t = 3)]
    target_from: u64,
    /// Frame on which the operator resets the alarm.
    #[arg(long)]
    reset_at: Option<u64>,
    /// Output directory for annotated frames.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Object tracker: none or bytetrack.
    #[arg(long, default_value = "none")]
    tracker: TrackerKind,
    /// Progress output: auto, plain, or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }
    let ui = Ui::from_flag(args.ui.as_deref());
    let task = args.task;

    let backend = {
        let _stage = ui.stage("Scripting detector");
        StubBackend::new(task.default_labels()).with_script(script(task, &args))
    };

    let settings = IngestSettings::default();
    let mut source = {
        let _stage = ui.stage("Opening synthetic source");
        let mut source = open_source(
            &SourceSpec::Video(format!("stub://demo?frames={}", args.frames)),
            &settings,
        )?;
        source.connect()?;
        source
    };

    let mut sink: Box<dyn FrameSink> = match &args.out {
        Some(dir) => Box::new(DirectorySink::create(dir)?.keep_frames(true)),
        None => Box::new(NullSink),
    };

    let annotator = Annotator::new(
        640,
        task.default_confidence(),
        task.default_target_labels(),
        task.palette(),
    );
    let mut session =
        MonitorSession::for_task(annotator, backend, LogNotifier::new(), DEMO_RECIPIENT, task)
            .with_tracker(args.tracker.build(settings.target_fps));

    {
        let _stage = ui.stage("Running monitor");
        while let Some(frame) = source.next_frame()? {
            let reset = args.reset_at == Some(frame.index());
            let outcome = session.process_frame(&frame, reset)?;
            let ids: Vec<u64> = outcome.detections.iter().filter_map(|d| d.track_id).collect();
            log::info!(
                "frame {:>3}: targets={} decision={:?} tracks={:?}{}",
                outcome.index,
                outcome.target_count,
                outcome.decision,
                ids,
                if reset { " (reset)" } else { "" }
            );
            sink.show(&outcome)?;
        }
    }

    println!(
        "{} frame(s), {} notification(s), latch {:?}",
        args.frames,
        session.notifier().sent(),
        session.latch().state()
    );
    if let Some(dir) = &args.out {
        println!("annotated frames in {}", dir.display());
    }
    Ok(())
}

/// One target detection per frame from `target_from` onward.
fn script(task: Task, args: &Args) -> Vec<Vec<Detection>> {
    let class_id = task.default_labels().len() - 1;
    let label = task.as_str();
    (1..=args.frames)
        .map(|index| {
            if index >= args.target_from {
                let x = 40.0 + (index % 10) as f32 * 20.0;
                vec![Detection::new(
                    class_id,
                    label,
                    0.9,
                    BoundingBox::new(x, 120.0, x + 120.0, 320.0),
                )]
            } else {
                Vec::new()
            }
        })
        .collect()
}
