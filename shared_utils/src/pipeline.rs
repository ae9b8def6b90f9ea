//! Run Coordinator
//!
//! Drives one downscale run: resolve candidates, then strictly one file at a
//! time go through name-marker skip → dry-run → backup → transcode → commit.
//! A failing file becomes a `Failed` outcome and the loop moves on; only setup
//! problems (see [`ShrinkError::is_setup_error`]) abort a run.

use crate::batch::resolve_candidates;
use crate::config::RunConfig;
use crate::engine::{load_capabilities, transcode, ConversionEngine, ShrinkOptions};
use crate::errors::{Result, ShrinkError};
use crate::image_formats::CapabilityTable;
use crate::run_log::RunLog;
use crate::safe_replace::{cleanup_temp, commit, destination_for, ensure_backup, temp_path_for};
use crate::safety::should_skip_by_name;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How many failures a caller should show before pointing at the log.
pub const FAILED_PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    DryRun,
    NameMarker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileOutcome {
    Succeeded {
        source: PathBuf,
        destination: PathBuf,
    },
    Skipped {
        path: PathBuf,
        /// Where a dry run would have written.
        destination: Option<PathBuf>,
        reason: SkipReason,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Succeeded { source, .. } => source,
            FileOutcome::Skipped { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Matched by extension but under an excluded directory.
    pub excluded: usize,
    /// Directories or entries the walk could not read.
    pub unreadable: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub outcomes: Vec<FileOutcome>,
    pub log_path: Option<PathBuf>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Succeeded { .. } => self.succeeded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed { path, reason } => {
                self.failed += 1;
                self.failures.push((path.clone(), reason.clone()));
            }
        }
        self.outcomes.push(outcome);
    }

    /// First `limit` failures in processing order.
    pub fn failed_preview(&self, limit: usize) -> &[(PathBuf, String)] {
        &self.failures[..self.failures.len().min(limit)]
    }
}

/// Passed to the progress observer after each file.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based.
    pub index: usize,
    pub total: usize,
    pub outcome: &'a FileOutcome,
}

pub struct Pipeline<'a> {
    config: RunConfig,
    engine: &'a dyn ConversionEngine,
    options: ShrinkOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Pipeline<'a> {
    /// Normalizes and validates `config` against `capabilities`; fails fast with
    /// a setup error before anything on disk is touched.
    pub fn new(
        config: RunConfig,
        engine: &'a dyn ConversionEngine,
        capabilities: &CapabilityTable,
    ) -> Result<Self> {
        let config = config.normalized();
        config.validate(capabilities)?;
        let options = ShrinkOptions::from_config(&config);
        Ok(Self {
            config,
            engine,
            options,
            cancel: None,
        })
    }

    /// Queries the engine's capabilities once, then builds the pipeline.
    pub fn with_engine_capabilities(
        config: RunConfig,
        engine: &'a dyn ConversionEngine,
    ) -> Result<Self> {
        let capabilities = load_capabilities(engine);
        Self::new(config, engine, &capabilities)
    }

    /// Checked before each file; setting it stops the run after the current file.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn run<F>(&self, mut on_progress: F) -> Result<RunSummary>
    where
        F: FnMut(Progress<'_>),
    {
        let start_time = Instant::now();
        let config = &self.config;

        let resolution = resolve_candidates(&config.root, &config.extensions);
        if resolution.candidates.is_empty() {
            return Err(ShrinkError::NoFilesMatched(config.root.clone()));
        }

        info!(
            files = resolution.candidates.len(),
            excluded = resolution.excluded,
            unreadable = resolution.unreadable,
            dry_run = config.dry_run,
            "📂 Found files to process"
        );

        let mut run_log = if config.write_log {
            match RunLog::create(&config.log_path(), config) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(
                        log = %config.log_path().display(),
                        error = %e,
                        "Run log unavailable, continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut summary = RunSummary {
            excluded: resolution.excluded,
            unreadable: resolution.unreadable,
            ..RunSummary::default()
        };
        let total = resolution.candidates.len();

        for (i, source) in resolution.candidates.iter().enumerate() {
            if self.is_cancelled() {
                warn!(remaining = total - i, "⏹️ Run cancelled");
                summary.cancelled = true;
                break;
            }

            let outcome = self.process_file(source);
            log_outcome(&outcome);
            if let Some(log) = run_log.as_mut() {
                log.record(&outcome);
            }
            on_progress(Progress {
                index: i + 1,
                total,
                outcome: &outcome,
            });
            summary.record(outcome);
        }

        summary.elapsed = start_time.elapsed();

        if let Some(log) = run_log {
            match log.finish(&summary) {
                Ok(path) => summary.log_path = Some(path),
                Err(e) => warn!(error = %e, "Failed to finish run log"),
            }
        }

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Run finished"
        );

        Ok(summary)
    }

    fn process_file(&self, source: &Path) -> FileOutcome {
        let config = &self.config;
        let destination = destination_for(source, config.output_format.as_deref());

        if config.skip_marked && should_skip_by_name(source, &config.skip_marker) {
            return FileOutcome::Skipped {
                path: source.to_path_buf(),
                destination: None,
                reason: SkipReason::NameMarker,
            };
        }

        if config.dry_run {
            return FileOutcome::Skipped {
                path: source.to_path_buf(),
                destination: Some(destination),
                reason: SkipReason::DryRun,
            };
        }

        if config.backup {
            if let Err(e) = ensure_backup(source) {
                return FileOutcome::Failed {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                };
            }
        }

        let temp = temp_path_for(source, &destination);
        // a leftover from a crashed run must not pass as fresh output
        cleanup_temp(&temp);

        let result = transcode(self.engine, source, &temp, &self.options)
            .and_then(|()| commit(source, &temp, &destination));

        match result {
            Ok(()) => FileOutcome::Succeeded {
                source: source.to_path_buf(),
                destination,
            },
            Err(e) => {
                cleanup_temp(&temp);
                FileOutcome::Failed {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn log_outcome(outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Succeeded {
            source,
            destination,
        } => info!(
            source = %source.display(),
            destination = %destination.display(),
            "✅ Shrunk"
        ),
        FileOutcome::Skipped { path, reason, .. } => {
            info!(path = %path.display(), reason = ?reason, "⏭️ Skipped")
        }
        FileOutcome::Failed { path, reason } => {
            warn!(path = %path.display(), reason = %reason, "❌ Failed")
        }
    }
}

/// One-shot run: query `engine` for capabilities, validate, process everything.
pub fn run_pipeline(config: RunConfig, engine: &dyn ConversionEngine) -> Result<RunSummary> {
    Pipeline::with_engine_capabilities(config, engine)?.run(|_| {})
}
