//! Safe Replacement Module
//!
//! Crash-safe commit of a transcoded temp file:
//! - in place: `rename(temp, source)`, the original stays intact until then
//! - conversion: clear destination, `rename(temp, destination)`, only then
//!   delete the source; at every instant at least one copy exists
//! - backups are taken once, before any mutation, and never overwritten
//! - temp artifacts never outlive the file they belong to

use crate::errors::{Result, ShrinkError};
use crate::image_formats::canonical_format;
use crate::safety::{BACKUP_SUFFIX, TEMP_MARKER};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Verify output file integrity before it replaces anything.
pub fn verify_output_integrity(output: &Path, min_size: u64) -> std::result::Result<(), String> {
    let metadata = match fs::metadata(output) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err("Output file does not exist".to_string())
        }
        Err(e) => return Err(format!("Cannot read output metadata: {}", e)),
    };

    if !metadata.is_file() {
        return Err("Output is not a regular file".to_string());
    }
    if metadata.len() == 0 {
        return Err("Output file is empty (0 bytes)".to_string());
    }
    if metadata.len() < min_size {
        return Err(format!(
            "Output file too small: {} < {} bytes",
            metadata.len(),
            min_size
        ));
    }

    let mut file = File::open(output).map_err(|e| format!("Cannot open output file: {}", e))?;
    let mut buffer = [0u8; 16];
    file.read(&mut buffer)
        .map_err(|e| format!("Cannot read output file: {}", e))?;

    Ok(())
}

/// Where `source` ends up: itself when no conversion is requested or the
/// source already has the target format (alias-aware), otherwise the same
/// stem with the new extension.
pub fn destination_for(source: &Path, output_format: Option<&str>) -> PathBuf {
    let Some(format) = output_format.filter(|f| !f.is_empty()) else {
        return source.to_path_buf();
    };
    let source_ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if canonical_format(&source_ext) == canonical_format(format) {
        return source.to_path_buf();
    }
    source.with_extension(format.trim_start_matches('.').to_lowercase())
}

/// Sibling temp path carrying the destination's extension, e.g.
/// `a.tif` → `a.shrinktmp.png`.
pub fn temp_path_for(source: &Path, destination: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let ext = destination
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_default();
    let mut name = stem;
    name.push(TEMP_MARKER);
    name.push(ext);
    source.with_file_name(name)
}

pub fn backup_path_for(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    source.with_file_name(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Created,
    AlreadyPresent,
}

/// Copies `source` to `source.bak` unless a backup already exists there.
pub fn ensure_backup(source: &Path) -> Result<BackupStatus> {
    let backup = backup_path_for(source);
    if backup.exists() {
        debug!(backup = %backup.display(), "Backup already present, keeping it");
        return Ok(BackupStatus::AlreadyPresent);
    }
    fs::copy(source, &backup).map_err(|source_err| ShrinkError::BackupFailed {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    Ok(BackupStatus::Created)
}

/// First half of a conversion commit: the new file takes its place.
pub fn move_into_place(temp: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        fs::remove_file(destination).map_err(|e| ShrinkError::CommitFailed {
            operation: "remove existing destination",
            path: destination.to_path_buf(),
            source: e,
        })?;
    }
    fs::rename(temp, destination).map_err(|e| ShrinkError::CommitFailed {
        operation: "move into place",
        path: destination.to_path_buf(),
        source: e,
    })
}

/// Second half of a conversion commit: the original is retired.
pub fn retire_source(source: &Path) -> Result<()> {
    fs::remove_file(source).map_err(|e| ShrinkError::CommitFailed {
        operation: "remove original",
        path: source.to_path_buf(),
        source: e,
    })
}

/// Makes `temp` the authoritative version of `source`.
pub fn commit(source: &Path, temp: &Path, destination: &Path) -> Result<()> {
    verify_output_integrity(temp, 1).map_err(ShrinkError::OutputInvalid)?;

    if destination == source {
        return fs::rename(temp, source).map_err(|e| ShrinkError::CommitFailed {
            operation: "replace in place",
            path: source.to_path_buf(),
            source: e,
        });
    }

    move_into_place(temp, destination)?;
    retire_source(source)
}

/// Removes a leftover temp file, if any. Never fails the caller.
pub fn cleanup_temp(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => debug!(temp = %temp.display(), "Removed temp artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(temp = %temp.display(), error = %e, "Failed to remove temp artifact"),
    }
}
