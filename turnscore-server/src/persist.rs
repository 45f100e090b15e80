// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Report persistence
//!
//! Writes the full report, the clean report and its HTML rendering side by
//! side. The caller-supplied basename is reduced to its final path component
//! and checked before anything touches the filesystem.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use turnscore_evals::{render_clean_html, CleanReport, FullReport};

/// Basename used when the caller does not supply one
pub const DEFAULT_BASENAME: &str = "combined_report";

/// Maximum length of a sanitized basename
pub const MAX_BASENAME_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Invalid save_basename '{name}': {reason}")]
    InvalidBasename { name: String, reason: String },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Paths of the three files written for one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPaths {
    pub combined: PathBuf,
    pub clean_json: PathBuf,
    pub clean_html: PathBuf,
}

/// Reduce a caller-supplied name to a safe file stem
///
/// Directory components are discarded and a trailing `.json` is dropped.
/// What remains must be non-empty, must not start with a dot and may only
/// contain ASCII letters, digits, `-`, `_` and `.`.
pub fn sanitize_basename(raw: &str) -> Result<String, PersistError> {
    let invalid = |reason: &str| PersistError::InvalidBasename {
        name: raw.to_string(),
        reason: reason.to_string(),
    };

    let last = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let stem = last.strip_suffix(".json").unwrap_or(last);
    let stem = stem.strip_suffix(".clean").unwrap_or(stem);

    if stem.is_empty() {
        return Err(invalid("empty file name"));
    }
    if stem.starts_with('.') {
        return Err(invalid("file name may not start with '.'"));
    }
    if stem.len() > MAX_BASENAME_LENGTH {
        return Err(invalid("file name too long"));
    }
    if let Some(c) = stem
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character '{}' not allowed", c)));
    }

    Ok(stem.to_string())
}

/// Target paths for `stem` inside `dir`
pub fn report_paths(dir: &Path, stem: &str) -> SavedPaths {
    SavedPaths {
        combined: dir.join(format!("{}.json", stem)),
        clean_json: dir.join(format!("{}.clean.json", stem)),
        clean_html: dir.join(format!("{}.clean.html", stem)),
    }
}

/// Write `<stem>.json`, `<stem>.clean.json` and `<stem>.clean.html` into `dir`
pub fn write_reports(
    dir: &Path,
    stem: &str,
    full: &FullReport,
    clean: &CleanReport,
) -> Result<SavedPaths, PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = report_paths(dir, stem);
    write_file(&paths.combined, &serde_json::to_vec_pretty(full)?)?;
    write_file(&paths.clean_json, &serde_json::to_vec_pretty(clean)?)?;
    write_file(&paths.clean_html, render_clean_html(clean).as_bytes())?;

    tracing::info!(
        combined = %paths.combined.display(),
        clean_json = %paths.clean_json.display(),
        clean_html = %paths.clean_html.display(),
        "Saved evaluation reports"
    );
    Ok(paths)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    std::fs::write(path, bytes).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}
