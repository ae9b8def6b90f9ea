//! Safety Module
//!
//! Path predicates used before anything is touched on disk:
//! - protected system directories are refused as a run root
//! - build/cache/VCS directories are never descended into
//! - our own temp artifacts and backups are never picked up as sources
//! - the optional "do not shrink" name marker

use std::path::{Component, Path};

const DANGEROUS_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/opt",
    "/tmp",
];

/// Directory names whose whole subtree is excluded from discovery.
pub const EXCLUDED_DIR_MARKERS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "build",
    "dist",
    "target",
    ".cache",
    ".idea",
    ".vscode",
];

/// Infix carried by every temporary output file, e.g. `foo.shrinktmp.png`.
pub const TEMP_MARKER: &str = ".shrinktmp.";

/// Suffix appended to the original file name when a backup is taken.
pub const BACKUP_SUFFIX: &str = ".bak";

pub fn check_dangerous_directory(path: &Path) -> Result<(), String> {
    let path_str = path.to_string_lossy();

    for dangerous in DANGEROUS_DIRS {
        if path_str == *dangerous {
            return Err(format!(
                "🚨 Target directory '{}' is a protected system directory",
                dangerous
            ));
        }
    }

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let canonical_str = canonical.to_string_lossy();
    if DANGEROUS_DIRS.iter().any(|d| canonical_str == *d) {
        return Err(format!(
            "🚨 Target directory '{}' resolves to a protected system directory",
            path.display()
        ));
    }

    // `/`, `home`, `<user>`
    let depth = canonical.components().count();
    if depth <= 3 && (canonical_str.starts_with("/Users/") || canonical_str.starts_with("/home/"))
    {
        return Err(format!(
            "🚨 Target '{}' is a home directory root, pick a subdirectory",
            path.display()
        ));
    }

    Ok(())
}

/// True when any directory segment of `path` is one of [`EXCLUDED_DIR_MARKERS`].
///
/// Only whole segments count: `builder/` or `my_build/` are not excluded.
pub fn must_exclude(path: &Path) -> bool {
    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        // the final component is the file itself
        if components.peek().is_none() {
            break;
        }
        if let Component::Normal(name) = component {
            let name = name.to_string_lossy();
            if EXCLUDED_DIR_MARKERS.iter().any(|m| *m == name) {
                return true;
            }
        }
    }
    false
}

/// True for files this tool writes itself (temp outputs and backups).
pub fn is_own_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let name = n.to_string_lossy().to_lowercase();
            name.contains(TEMP_MARKER) || name.ends_with(BACKUP_SUFFIX)
        })
        .unwrap_or(false)
}

/// Case-insensitive substring test of `marker` against the file's base name.
pub fn should_skip_by_name(path: &Path, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }
    path.file_name()
        .map(|n| {
            n.to_string_lossy()
                .to_lowercase()
                .contains(&marker.to_lowercase())
        })
        .unwrap_or(false)
}
