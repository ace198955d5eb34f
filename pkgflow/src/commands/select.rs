//! Evaluate a selection expression over a directory of archives

use super::CommandError;
use pkgflow_core::Selection;
use pkgflow_core::selection::package_of_archive;
use std::path::Path;

/// Print the selected archives, one per line
pub fn execute(dir: &Path, expr: &str, all: bool) -> Result<(), CommandError> {
    let selection = Selection::parse(expr, all)?;
    let selected = selection.select_dir(dir)?;

    for path in &selected {
        let file = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
        match package_of_archive(file) {
            Some(package) => println!("{package}\t{}", path.display()),
            None => println!("{}", path.display()),
        }
    }
    tracing::info!(dir = %dir.display(), selected = selected.len(), "Selection evaluated");

    Ok(())
}
