use std::path::{Path, PathBuf};

/// Find every `*.<ext>` file under `dir`, recursively, sorted by path.
///
/// Unreadable entries are logged and skipped.
pub fn find_reports(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{base}/**/*.{}", glob::Pattern::escape(ext));

    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path during discovery");
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Where the table for `report` is written: same directory, new extension.
pub fn table_path_for(report: &Path, ext: &str) -> PathBuf {
    report.with_extension(ext)
}
