//! Terminal progress output for the binaries.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::monitor::FrameOutcome;
use crate::sink::FrameSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Mode from a `--ui` flag, terminal detection from stderr.
    pub fn from_flag(flag: Option<&str>) -> Self {
        let mode = match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, std::io::stderr().is_terminal())
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Wrap `inner` so every displayed frame ticks a live counter.
    pub fn frame_counter<S: FrameSink>(&self, inner: S) -> CountingSink<S> {
        let bar = if self.pretty() {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{spinner} frame {pos} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            Some(bar)
        } else {
            None
        };
        CountingSink {
            inner,
            bar,
            alerted: false,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct CountingSink<S> {
    inner: S,
    bar: Option<ProgressBar>,
    alerted: bool,
}

impl<S> CountingSink<S> {
    pub fn into_inner(self) -> S {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
        self.inner
    }
}

impl<S: FrameSink> FrameSink for CountingSink<S> {
    fn show(&mut self, outcome: &FrameOutcome) -> Result<()> {
        if let Some(bar) = &self.bar {
            bar.set_position(outcome.index);
            if outcome.delivery.is_some() && !self.alerted {
                self.alerted = true;
                bar.set_message("(alert raised)");
            }
        }
        self.inner.show(outcome)
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_switches_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn plain_mode_never_draws() {
        let ui = Ui::new(UiMode::Plain, true);
        assert!(!ui.pretty());
        assert!(ui.frame_counter(crate::sink::NullSink).bar.is_none());
        assert!(Ui::new(UiMode::Pretty, false).frame_counter(crate::sink::NullSink).bar.is_none());
    }
}
