//! Batch Processing Module
//!
//! Candidate discovery for a run: one recursive walk under the root, matched
//! against the requested extension set, with excluded locations and our own
//! artifacts filtered out. The result is sorted so the same tree always yields
//! the same processing order.

use crate::safety::{is_own_artifact, must_exclude};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lower-cased extension of `path`, empty when there is none.
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    let ext = get_extension_lowercase(path);
    !ext.is_empty() && extensions.iter().any(|e| e.as_ref() == ext)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub candidates: Vec<PathBuf>,
    /// Matched by extension but located under an excluded directory.
    pub excluded: usize,
    /// Subtrees or entries that could not be read.
    pub unreadable: usize,
}

/// Expands `extensions` into the de-duplicated, stably ordered list of matching
/// files under `root`.
pub fn resolve_candidates<S: AsRef<str>>(root: &Path, extensions: &[S]) -> Resolution {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();
    let mut resolution = Resolution::default();

    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                resolution.unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !has_extension(path, extensions) || is_own_artifact(path) {
            continue;
        }
        if must_exclude(path) {
            debug!(path = %path.display(), "Excluded by location");
            resolution.excluded += 1;
            continue;
        }
        found.insert(path.to_path_buf());
    }

    resolution.candidates = found.into_iter().collect();
    resolution
}
