//! Format Capability Table
//!
//! Parses the engine's `-list format` table into typed entries:
//!
//! ```text
//!    Format  Module    Mode  Description
//! -------------------------------------------------------------------------------
//!       PNG* PNG       rw-   Portable Network Graphics (libpng 1.6.43)
//!                            See http://www.libpng.org/ for details about the PNG format.
//! ```
//!
//! Malformed rows are rejected explicitly and counted, never half-parsed.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Canonical name ↔ common abbreviation.
pub const FORMAT_ALIASES: &[(&str, &str)] = &[("tiff", "tif"), ("jpeg", "jpg")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FormatMode {
    pub read: bool,
    pub write: bool,
    pub multi_frame: bool,
}

impl FormatMode {
    /// Parses a 1–3 char mode field, positions `[r-][w-][+-]`.
    pub fn parse(field: &str) -> Option<Self> {
        let chars: Vec<char> = field.chars().collect();
        if chars.is_empty() || chars.len() > 3 {
            return None;
        }
        let mut mode = FormatMode::default();
        for (i, c) in chars.iter().enumerate() {
            match (i, c) {
                (0, 'r') => mode.read = true,
                (1, 'w') => mode.write = true,
                (2, '+') => mode.multi_frame = true,
                (_, '-') => {}
                _ => return None,
            }
        }
        Some(mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatEntry {
    pub token: String,
    pub module: String,
    pub mode: FormatMode,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatLine {
    Entry(FormatEntry),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingFields,
    EmptyToken,
    InvalidMode(String),
}

/// Parses one data row. Blank, header and separator lines are `Ignored`.
pub fn parse_format_line(line: &str) -> Result<FormatLine, RowError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '-') {
        return Ok(FormatLine::Ignored);
    }

    let raw_token = trimmed
        .split_whitespace()
        .next()
        .ok_or(RowError::MissingFields)?;
    if raw_token == "Format" {
        return Ok(FormatLine::Ignored);
    }

    let mut parts = trimmed[raw_token.len()..].trim_start().splitn(2, char::is_whitespace);
    let module = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or(RowError::MissingFields)?;
    let mut parts = parts.next().unwrap_or_default().trim_start().splitn(2, char::is_whitespace);
    let mode_field = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or(RowError::MissingFields)?;
    let description = parts.next().unwrap_or_default().trim();

    let token = raw_token.trim_end_matches('*').to_lowercase();
    if token.is_empty() {
        return Err(RowError::EmptyToken);
    }

    let mode =
        FormatMode::parse(mode_field).ok_or_else(|| RowError::InvalidMode(mode_field.into()))?;

    Ok(FormatLine::Entry(FormatEntry {
        token,
        module: module.to_string(),
        mode,
        description: description.to_string(),
    }))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityTable {
    pub entries: Vec<FormatEntry>,
    pub rejected_rows: usize,
}

impl CapabilityTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn readable_extensions(&self) -> BTreeSet<String> {
        with_aliases(self.entries.iter().filter(|e| e.mode.read))
    }

    pub fn writable_extensions(&self) -> BTreeSet<String> {
        with_aliases(self.entries.iter().filter(|e| e.mode.write))
    }

    pub fn is_writable(&self, format: &str) -> bool {
        let format = normalize_token(format);
        !format.is_empty() && self.writable_extensions().contains(&format)
    }
}

fn with_aliases<'a>(entries: impl Iterator<Item = &'a FormatEntry>) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = entries.map(|e| e.token.clone()).collect();
    for (canonical, short) in FORMAT_ALIASES {
        if set.contains(*canonical) || set.contains(*short) {
            set.insert(canonical.to_string());
            set.insert(short.to_string());
        }
    }
    set
}

/// Lower-cases and strips a leading dot: `".PNG"` → `"png"`.
pub fn normalize_token(token: &str) -> String {
    token.trim().trim_start_matches('.').to_lowercase()
}

/// Folds a token to its canonical alias form: `"tif"` → `"tiff"`.
pub fn canonical_format(token: &str) -> String {
    let token = normalize_token(token);
    FORMAT_ALIASES
        .iter()
        .find(|(_, short)| *short == token)
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or(token)
}

/// Parses the whole `-list format` output.
pub fn parse_format_table(text: &str) -> CapabilityTable {
    let mut table = CapabilityTable::default();
    let mut description_column: Option<usize> = None;

    for line in text.lines() {
        if description_column.is_none() && line.trim_start().starts_with("Format") {
            description_column = line.find("Description");
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if let Some(col) = description_column {
            if !line.trim().is_empty() && indent >= col {
                // continuation of the previous row's description
                continue;
            }
        }

        match parse_format_line(line) {
            Ok(FormatLine::Entry(entry)) => table.entries.push(entry),
            Ok(FormatLine::Ignored) => {}
            Err(e) => {
                debug!(line = %line.trim(), error = ?e, "Rejected format row");
                table.rejected_rows += 1;
            }
        }
    }

    table
}
