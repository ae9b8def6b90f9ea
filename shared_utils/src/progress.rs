//! Progress Bar Module
//!
//! One batch bar per run, fed by the pipeline's progress observer.
//! Style: ████████▓░░░░░░░

use crate::pipeline::{FileOutcome, Progress};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub mod progress_style {
    /// indicatif needs 3 chars: (filled, current, empty)
    pub const PROGRESS_CHARS: &str = "█▓░";

    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

    pub const BATCH_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} (ETA: {eta}) • {msg}";
}

const MESSAGE_NAME_WIDTH: usize = 40;

/// Batch bar on stderr; `hidden` draws nothing (JSON output, non-tty).
pub fn create_progress_bar(total: u64, prefix: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);

    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    let style = ProgressStyle::default_bar()
        .template(progress_style::BATCH_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress_style::PROGRESS_CHARS)
        .tick_chars(progress_style::SPINNER_CHARS);
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Tracks per-outcome counts next to the bar.
pub struct BatchProgress {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(total: u64, prefix: &str, hidden: bool) -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            bar: create_progress_bar(total, prefix, hidden),
        }
    }

    /// Observer for [`crate::pipeline::Pipeline::run`].
    pub fn observe(&mut self, progress: Progress<'_>) {
        let name = progress
            .outcome
            .path()
            .file_name()
            .map(|n| truncate_filename(&n.to_string_lossy(), MESSAGE_NAME_WIDTH))
            .unwrap_or_default();

        match progress.outcome {
            FileOutcome::Succeeded { .. } => {
                self.succeeded += 1;
                self.bar.set_message(format!("✅ {}", name));
            }
            FileOutcome::Skipped { .. } => {
                self.skipped += 1;
                self.bar.set_message(format!("⏭️  {}", name));
            }
            FileOutcome::Failed { .. } => {
                self.failed += 1;
                self.bar.set_message(format!("❌ {}", name));
            }
        }
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.index as u64);
    }

    pub fn finish(&self) {
        self.bar.finish_with_message(format!(
            "Complete: {} succeeded, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        ));
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

fn truncate_filename(filename: &str, max_len: usize) -> String {
    let chars: Vec<char> = filename.chars().collect();
    if chars.len() <= max_len {
        return filename.to_string();
    }
    let half = max_len.saturating_sub(3) / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{}...{}", head, tail)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}
