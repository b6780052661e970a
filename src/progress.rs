use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::error::StageError;
use crate::workflow::{RunReport, Stage};

/// Receives stage transitions of one run
pub trait ProgressReporter: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _artifact: &Path) {}
    /// A stage whose artifact survived from an earlier run
    fn stage_skipped(&self, _stage: Stage, _artifact: &Path) {}
    fn run_failed(&self, _error: &StageError) {}
    fn run_finished(&self, _report: &RunReport) {}
}

/// Reporter that ignores everything
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

/// Stage progress on stdout: a four step bar per run, one line per stage.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(Stage::ALL.len() as u64), ProgressDrawTarget::stdout());
        Self::attach(bar, label)
    }

    /// Reporter whose bar shares the screen with other concurrent runs
    pub fn in_group(group: &MultiProgress, label: &str) -> Self {
        let bar = group.add(ProgressBar::new(Stage::ALL.len() as u64));
        Self::attach(bar, label)
    }

    /// Multi-bar container drawing to stdout, for batch runs
    pub fn group() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::stdout())
    }

    fn attach(bar: ProgressBar, label: &str) -> Self {
        let style = ProgressStyle::with_template("{spinner:.green} {prefix:.bold} [{bar:20.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Plain line above the bar; straight to stdout when nothing is drawn
    fn line(&self, message: String) {
        if self.bar.is_hidden() {
            println!("{}", message);
        } else {
            self.bar.println(message);
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn stage_started(&self, stage: Stage) {
        self.bar.set_message(format!("{}...", stage));
        self.line(format!("{}...", stage));
    }

    fn stage_finished(&self, stage: Stage, artifact: &Path) {
        self.bar.inc(1);
        self.line(format!("✓ {} -> {}", stage, artifact.display()));
    }

    fn stage_skipped(&self, stage: Stage, artifact: &Path) {
        self.bar.inc(1);
        self.line(format!("↷ {} (kept {})", stage, artifact.display()));
    }

    fn run_failed(&self, error: &StageError) {
        self.bar.abandon_with_message(format!("✗ {} failed", error.stage));
    }

    fn run_finished(&self, report: &RunReport) {
        self.bar.finish_with_message(format!("done: {}", report.artifacts.output_video.display()));
    }
}
