//! Plain-text run log written into the target root.
//!
//! ```text
//! === Downscale run started 2026-10-17 14:02:11 ===
//! root: /data/textures
//! ...
//! OK: /data/textures/a.tif -> /data/textures/a.png
//! FAIL: /data/textures/c.png (Engine exited with status 1: ...)
//! === Summary: OK=1 SKIPPED=0 FAILED=1 ===
//! === Downscale run finished 2026-10-17 14:02:15 ===
//! ```

use crate::config::RunConfig;
use crate::pipeline::{FileOutcome, RunSummary, SkipReason};
use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    /// Truncates any previous log at `path` and writes the run header.
    pub fn create(path: &Path, config: &RunConfig) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut log = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        };
        log.write_header(config)?;
        Ok(log)
    }

    fn write_header(&mut self, config: &RunConfig) -> io::Result<()> {
        writeln!(
            self.writer,
            "=== Downscale run started {} ===",
            Local::now().format(TIMESTAMP_FORMAT)
        )?;
        writeln!(self.writer, "root: {}", config.root.display())?;
        writeln!(self.writer, "max_edge: {}", config.max_edge)?;
        writeln!(self.writer, "extensions: {}", config.extensions.join(", "))?;
        writeln!(
            self.writer,
            "output_format: {}",
            config.output_format.as_deref().unwrap_or("(keep original)")
        )?;
        writeln!(self.writer, "strip_metadata: {}", config.strip_metadata)?;
        writeln!(self.writer, "max_png_compression: {}", config.max_png_compression)?;
        writeln!(
            self.writer,
            "skip_marked: {} (marker '{}')",
            config.skip_marked, config.skip_marker
        )?;
        writeln!(self.writer, "pixel_art: {}", config.pixel_art)?;
        writeln!(self.writer, "dry_run: {}", config.dry_run)?;
        writeln!(self.writer, "backup: {}", config.backup)?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    /// Appends one outcome line. Write errors are logged, never propagated.
    pub fn record(&mut self, outcome: &FileOutcome) {
        let line = format_outcome(outcome);
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            warn!(log = %self.path.display(), error = %e, "Failed to write run log line");
        }
    }

    /// Writes the trailing summary section and closes the log.
    pub fn finish(mut self, summary: &RunSummary) -> io::Result<PathBuf> {
        writeln!(self.writer)?;
        if summary.cancelled {
            writeln!(self.writer, "Run cancelled before all files were processed")?;
        }
        if summary.excluded > 0 {
            writeln!(self.writer, "Excluded by location: {}", summary.excluded)?;
        }
        if summary.unreadable > 0 {
            writeln!(self.writer, "Unreadable entries skipped: {}", summary.unreadable)?;
        }
        writeln!(
            self.writer,
            "=== Summary: OK={} SKIPPED={} FAILED={} ===",
            summary.succeeded, summary.skipped, summary.failed
        )?;
        writeln!(
            self.writer,
            "=== Downscale run finished {} ===",
            Local::now().format(TIMESTAMP_FORMAT)
        )?;
        self.writer.flush()?;
        Ok(self.path)
    }
}

pub fn format_outcome(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Succeeded {
            source,
            destination,
        } if source != destination => {
            format!("OK: {} -> {}", source.display(), destination.display())
        }
        FileOutcome::Succeeded { source, .. } => format!("OK: {}", source.display()),
        FileOutcome::Skipped {
            path,
            destination,
            reason: SkipReason::DryRun,
        } => match destination {
            Some(dest) if dest != path => {
                format!("DRYRUN: {} -> {}", path.display(), dest.display())
            }
            _ => format!("DRYRUN: {}", path.display()),
        },
        FileOutcome::Skipped {
            path,
            reason: SkipReason::NameMarker,
            ..
        } => format!("SKIP: {} (name marker)", path.display()),
        FileOutcome::Failed { path, reason } => {
            format!("FAIL: {} ({})", path.display(), reason)
        }
    }
}
