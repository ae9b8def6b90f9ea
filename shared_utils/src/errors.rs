//! Shared Error Types
//!
//! One enum for the whole downscale pipeline. Setup errors abort a run before any
//! file is touched; every other variant is caught per file by the pipeline and
//! turned into a `FAIL:` line.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShrinkError {
    #[error("Conversion engine not found (tried: {0})")]
    EngineNotFound(String),

    #[error("Target root does not exist or is not a directory: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Refusing target root {}: {reason}", .path.display())]
    ProtectedRoot { path: PathBuf, reason: String },

    #[error("No input extensions selected")]
    NoExtensions,

    #[error("Maximum edge length must be greater than zero")]
    InvalidMaxEdge,

    #[error("Output format '{0}' is not writable by the conversion engine")]
    FormatNotWritable(String),

    #[error("No matching files found under {}", .0.display())]
    NoFilesMatched(PathBuf),

    #[error("Invalid config file {}: {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("Engine exited with status {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    EngineFailed { code: Option<i32>, stderr: String },

    #[error("Engine output missing or empty: {0}")]
    OutputInvalid(String),

    #[error("Backup failed for {}: {source}", .path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Commit failed ({operation}) for {}: {source}", .path.display())]
    CommitFailed {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShrinkError {
    /// True for errors that abort the whole run rather than a single file.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            ShrinkError::EngineNotFound(_)
                | ShrinkError::RootNotFound(_)
                | ShrinkError::ProtectedRoot { .. }
                | ShrinkError::NoExtensions
                | ShrinkError::InvalidMaxEdge
                | ShrinkError::FormatNotWritable(_)
                | ShrinkError::NoFilesMatched(_)
                | ShrinkError::InvalidConfig { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ShrinkError>;
