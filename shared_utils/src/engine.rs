//! Conversion Engine
//!
//! All pixel work is delegated to an external engine (ImageMagick). This module
//! owns the seam:
//! - `ConversionEngine`: one conversion per call, swappable in tests
//! - `MagickEngine`: the real subprocess implementation
//! - `transcode`: the per-file failure contract (exit status + output check)
//! - `load_capabilities`: one `-list format` query per run

use crate::config::RunConfig;
use crate::errors::{Result, ShrinkError};
use crate::image_formats::{parse_format_table, CapabilityTable};
use crate::logging::execute_external_command;
use crate::safe_replace::verify_output_integrity;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShrinkOptions {
    pub max_edge: u32,
    pub strip_metadata: bool,
    /// Nearest-neighbour resampling.
    pub pixel_art: bool,
    /// Only honoured when the *output* file is a PNG.
    pub max_png_compression: bool,
}

impl ShrinkOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_edge: config.max_edge,
            strip_metadata: config.strip_metadata,
            pixel_art: config.pixel_art,
            max_png_compression: config.max_png_compression,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl EngineStatus {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait ConversionEngine {
    fn name(&self) -> &str;

    /// Reads `input`, shrinks it per `options` and writes `output`, whose
    /// extension selects the encoder. `Err` only when the engine could not run.
    fn convert(&self, input: &Path, output: &Path, options: &ShrinkOptions)
        -> Result<EngineStatus>;

    /// Raw `-list format` style table, `None` when unavailable.
    fn list_formats(&self) -> Option<String> {
        None
    }
}

/// Size an image of `width`×`height` ends up with under a shrink-only bound of
/// `max_edge`. Never enlarges; the longer edge lands exactly on `max_edge`.
pub fn shrink_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if max_edge == 0 || (width <= max_edge && height <= max_edge) {
        return (width, height);
    }
    let scale = |short: u32, long: u32| -> u32 {
        let scaled = (short as u64 * max_edge as u64 + long as u64 / 2) / long as u64;
        (scaled as u32).max(1)
    };
    if width >= height {
        (max_edge, scale(height, width))
    } else {
        (scale(width, height), max_edge)
    }
}

/// Path as a command-line argument that can't be mistaken for an option.
pub fn safe_path_arg(path: &Path) -> Cow<'_, str> {
    let s = path.to_string_lossy();
    if s.starts_with('-') {
        Cow::Owned(format!("./{}", s))
    } else {
        s
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Arguments for one shrink: `input [-strip] [-filter point] -resize NxN> [png opts] output`.
pub fn build_shrink_args(input: &Path, output: &Path, options: &ShrinkOptions) -> Vec<String> {
    let mut args = vec![safe_path_arg(input).into_owned()];
    if options.strip_metadata {
        args.push("-strip".to_string());
    }
    if options.pixel_art {
        args.push("-filter".to_string());
        args.push("point".to_string());
    }
    // '>' = only shrink larger images
    args.push("-resize".to_string());
    args.push(format!("{0}x{0}>", options.max_edge));
    if options.max_png_compression && is_png(output) {
        args.push("-define".to_string());
        args.push("png:compression-level=9".to_string());
    }
    args.push(safe_path_arg(output).into_owned());
    args
}

#[derive(Debug, Clone)]
pub struct MagickEngine {
    program: PathBuf,
}

impl MagickEngine {
    #[cfg(not(windows))]
    const CANDIDATES: &'static [&'static str] = &["magick", "convert"];
    // convert.exe on Windows is the filesystem tool, never ImageMagick
    #[cfg(windows)]
    const CANDIDATES: &'static [&'static str] = &["magick"];

    pub fn locate() -> Result<Self> {
        for candidate in Self::CANDIDATES {
            if let Ok(program) = which::which(candidate) {
                info!(engine = %program.display(), "Using conversion engine");
                return Ok(Self { program });
            }
        }
        Err(ShrinkError::EngineNotFound(Self::CANDIDATES.join(", ")))
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ConversionEngine for MagickEngine {
    fn name(&self) -> &str {
        "ImageMagick"
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ShrinkOptions,
    ) -> Result<EngineStatus> {
        let args = build_shrink_args(input, output, options);
        let result = execute_external_command(&self.program, &args)?;
        Ok(EngineStatus {
            exit_code: result.exit_code,
            stderr: result.stderr,
        })
    }

    fn list_formats(&self) -> Option<String> {
        let args = ["-list".to_string(), "format".to_string()];
        match execute_external_command(&self.program, &args) {
            Ok(result) if result.success() && !result.stdout.trim().is_empty() => {
                Some(result.stdout)
            }
            Ok(result) => {
                warn!(exit_code = ?result.exit_code, "Format listing returned no usable output");
                None
            }
            Err(e) => {
                warn!(error = %e, "Format listing could not be run");
                None
            }
        }
    }
}

/// Queries the engine's format table once. Failure degrades to an empty table.
pub fn load_capabilities(engine: &dyn ConversionEngine) -> CapabilityTable {
    match engine.list_formats() {
        Some(text) => {
            let table = parse_format_table(&text);
            info!(
                engine = engine.name(),
                formats = table.entries.len(),
                rejected = table.rejected_rows,
                "Loaded format capabilities"
            );
            table
        }
        None => {
            warn!(
                engine = engine.name(),
                "No format capabilities available, format conversion disabled"
            );
            CapabilityTable::default()
        }
    }
}

/// Runs one conversion into `temp` and applies the failure contract: a non-zero
/// exit and a missing or empty output are both failures.
pub fn transcode(
    engine: &dyn ConversionEngine,
    source: &Path,
    temp: &Path,
    options: &ShrinkOptions,
) -> Result<()> {
    let status = engine.convert(source, temp, options)?;
    if !status.success() {
        return Err(ShrinkError::EngineFailed {
            code: status.exit_code,
            stderr: status.stderr.trim().to_string(),
        });
    }
    verify_output_integrity(temp, 1).map_err(ShrinkError::OutputInvalid)
}
