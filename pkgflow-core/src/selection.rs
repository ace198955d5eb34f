//! Package selection expressions
//!
//! A selection is a comma-separated list of patterns matched against the
//! start of archive file names. `.` and `*` keep their regular-expression
//! meaning; every other character matches literally. Matching is
//! case-sensitive.
//!
//! An empty expression selects every archive when the "all" flag is set and
//! nothing otherwise.

use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Archive suffix of downloaded source packages
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Errors raised while building or applying a selection
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Invalid selection expression '{expr}': {source}")]
    InvalidPattern {
        expr: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to scan {0}: {1}")]
    Scan(PathBuf, #[source] walkdir::Error),
}

/// Result type for selection operations
pub type SelectionResult<T> = Result<T, SelectionError>;

/// Compiled selection expression
#[derive(Debug, Clone)]
pub struct Selection {
    pattern: Option<Regex>,
    all: bool,
}

impl Selection {
    /// Compile an expression
    pub fn parse(expr: &str, all: bool) -> SelectionResult<Self> {
        let alternatives: Vec<String> = expr
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(translate)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None, all });
        }

        let source = format!("^(?:{})", alternatives.join("|"));
        let pattern = Regex::new(&source).map_err(|source| SelectionError::InvalidPattern {
            expr: expr.to_string(),
            source,
        })?;

        Ok(Self {
            pattern: Some(pattern),
            all,
        })
    }

    /// Selection that matches every archive
    pub fn everything() -> Self {
        Self {
            pattern: None,
            all: true,
        }
    }

    /// Whether an archive file name is selected
    pub fn matches(&self, file_name: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(file_name),
            None => self.all,
        }
    }

    /// Selected archives directly inside `dir`, sorted by file name
    pub fn select_dir(&self, dir: &Path) -> SelectionResult<Vec<PathBuf>> {
        let mut selected = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| SelectionError::Scan(dir.to_path_buf(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.ends_with(ARCHIVE_SUFFIX) && self.matches(name) {
                selected.push(entry.into_path());
            }
        }

        Ok(selected)
    }
}

/// Escape everything except `.` and `*`
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '.' | '*' => out.push(ch),
            _ => out.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

/// Package name of an archive file name, `teal_0.14.0.tar.gz` -> `teal`
pub fn package_of_archive(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
    stem.split_once('_').map(|(name, _)| name)
}
