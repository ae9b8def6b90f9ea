//! Run Configuration
//!
//! `RunConfig` is built once (CLI flags or a JSON file), normalized, validated
//! against the engine's capability table and then treated as immutable for the
//! whole run.

use crate::errors::{Result, ShrinkError};
use crate::image_formats::{normalize_token, CapabilityTable};
use crate::safety::check_dangerous_directory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_EDGE: u32 = 2048;
pub const DEFAULT_LOG_FILE_NAME: &str = "downscale_log.txt";
pub const DEFAULT_SKIP_MARKER: &str = "_noshrink";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub root: PathBuf,
    pub max_edge: u32,
    /// Lower-case, no leading dot, deduplicated after [`RunConfig::normalized`].
    pub extensions: Vec<String>,
    /// `None` keeps each file's original format.
    pub output_format: Option<String>,
    pub strip_metadata: bool,
    pub max_png_compression: bool,
    pub skip_marked: bool,
    pub skip_marker: String,
    pub pixel_art: bool,
    pub dry_run: bool,
    pub backup: bool,
    pub write_log: bool,
    pub log_file_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_edge: DEFAULT_MAX_EDGE,
            extensions: vec!["png".to_string()],
            output_format: None,
            strip_metadata: false,
            max_png_compression: false,
            skip_marked: false,
            skip_marker: DEFAULT_SKIP_MARKER.to_string(),
            pixel_art: false,
            dry_run: false,
            backup: true,
            write_log: true,
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
        }
    }
}

impl RunConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ShrinkError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: RunConfig =
            serde_json::from_str(&text).map_err(|e| ShrinkError::InvalidConfig {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(config.normalized())
    }

    /// Lower-cases tokens, strips dots, dedupes extensions into a stable order and
    /// maps an empty output format to `None`.
    pub fn normalized(mut self) -> Self {
        let extensions: BTreeSet<String> = self
            .extensions
            .iter()
            .map(|e| normalize_token(e))
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions = extensions.into_iter().collect();
        self.output_format = self
            .output_format
            .as_deref()
            .map(normalize_token)
            .filter(|f| !f.is_empty());
        self
    }

    /// Re-checks every run invariant. Nothing on disk is touched.
    pub fn validate(&self, capabilities: &CapabilityTable) -> Result<()> {
        if self.extensions.iter().all(|e| normalize_token(e).is_empty()) {
            return Err(ShrinkError::NoExtensions);
        }
        if self.max_edge == 0 {
            return Err(ShrinkError::InvalidMaxEdge);
        }
        if !self.root.is_dir() {
            return Err(ShrinkError::RootNotFound(self.root.clone()));
        }
        if let Err(reason) = check_dangerous_directory(&self.root) {
            return Err(ShrinkError::ProtectedRoot {
                path: self.root.clone(),
                reason,
            });
        }
        if let Some(format) = self.output_format.as_deref() {
            let format = normalize_token(format);
            if !format.is_empty() && !capabilities.is_writable(&format) {
                return Err(ShrinkError::FormatNotWritable(format));
            }
        }
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.log_file_name)
    }
}
