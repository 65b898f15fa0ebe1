use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use walkdir::WalkDir;

use crate::errors::{BgtxError, Result};

/// Splits a comma-separated list of paths, trimming entries and dropping blanks.
pub fn parse_path_list(line: &str) -> Vec<PathBuf> {
    line.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Paths from `paths` that do not exist, in their original order.
pub fn find_missing(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| !p.exists()).cloned().collect()
}

/// Fails with a validation error naming every path that does not exist.
pub fn ensure_exist(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Err(BgtxError::Validation {
            field: "paths".to_string(),
            reason: "must name at least one file".to_string(),
        });
    }

    let missing = find_missing(paths);
    if missing.is_empty() {
        return Ok(());
    }
    Err(BgtxError::Validation {
        field: "paths".to_string(),
        reason: format!("not found: {}", join_paths(&missing)),
    })
}

/// Replaces every directory in `paths` with the images found beneath it.
///
/// Files are kept as given. Directory contents are walked in file name order;
/// only recognised image extensions are picked up, and files whose stem
/// already ends with `suffix` are skipped so earlier outputs are not fed back in.
pub fn expand_directories(paths: &[PathBuf], suffix: &str) -> Result<Vec<PathBuf>> {
    let mut expanded = Vec::with_capacity(paths.len());

    for path in paths {
        if !path.is_dir() {
            expanded.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| BgtxError::FileSystem {
                path: e.path().unwrap_or(path.as_path()).to_path_buf(),
                operation: "directory walk".to_string(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() && is_candidate(entry.path(), suffix) {
                expanded.push(entry.into_path());
            }
        }
    }

    Ok(expanded)
}

fn is_candidate(path: &Path, suffix: &str) -> bool {
    let already_processed = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(suffix));
    !already_processed && ImageFormat::from_path(path).is_ok()
}

/// Asks for a comma-separated list of paths until every entry exists.
///
/// Returns a validation error when `reader` reaches end of input.
pub fn prompt_for_paths<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<Vec<PathBuf>> {
    loop {
        write!(
            writer,
            "Enter the full paths of the images to process, separated by commas \
             (e.g. /path/photo1.png,/path/photo2.jpg): "
        )?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(BgtxError::Validation {
                field: "paths".to_string(),
                reason: "input ended before any path was given".to_string(),
            });
        }

        let paths = parse_path_list(&line);
        if paths.is_empty() {
            writeln!(writer, "ERROR: no file paths were entered.")?;
            continue;
        }

        let missing = find_missing(&paths);
        if missing.is_empty() {
            return Ok(paths);
        }
        writeln!(
            writer,
            "ERROR: these paths are invalid or could not be found: {}",
            join_paths(&missing)
        )?;
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
