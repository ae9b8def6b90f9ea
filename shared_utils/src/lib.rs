//! Shared Utilities for the img_shrink tool
//!
//! Everything the binary needs to run a recursive downscale pass:
//! - Path filtering (excluded directories, own artifacts, name markers, protected roots)
//! - Engine capability table parsing (`magick -list format`)
//! - Candidate discovery
//! - Engine invocation behind the `ConversionEngine` trait
//! - Crash-safe replacement with one-time backups
//! - The run coordinator, run log, progress bar and summary report
//! - Logging setup and external command tracing

pub mod batch;
pub mod config;
pub mod engine;
pub mod errors;
pub mod image_formats;
pub mod logging;
pub mod pipeline;
#[cfg(test)]
mod pipeline_tests;
pub mod progress;
pub mod report;
pub mod run_log;
pub mod safe_replace;
pub mod safety;

pub use batch::{get_extension_lowercase, has_extension, resolve_candidates, Resolution};
pub use config::{RunConfig, DEFAULT_LOG_FILE_NAME, DEFAULT_MAX_EDGE, DEFAULT_SKIP_MARKER};
pub use engine::{
    build_shrink_args, load_capabilities, safe_path_arg, shrink_dimensions, transcode,
    ConversionEngine, EngineStatus, MagickEngine, ShrinkOptions,
};
pub use errors::{Result, ShrinkError};
pub use image_formats::{
    canonical_format, parse_format_line, parse_format_table, CapabilityTable, FormatEntry,
    FormatLine, FormatMode, RowError,
};
pub use logging::{init_logging, LogConfig};
pub use pipeline::{
    run_pipeline, FileOutcome, Pipeline, Progress, RunSummary, SkipReason, FAILED_PREVIEW_LIMIT,
};
pub use progress::{create_progress_bar, format_duration, BatchProgress};
pub use report::print_summary_report;
pub use run_log::RunLog;
pub use safe_replace::{
    backup_path_for, commit, destination_for, ensure_backup, temp_path_for, BackupStatus,
};
pub use safety::{check_dangerous_directory, is_own_artifact, must_exclude, should_skip_by_name};
