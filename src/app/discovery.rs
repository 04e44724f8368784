// LogWarden - app/discovery.rs
//
// Expands command-line paths into attachment files. Files named explicitly
// are always taken; directories are scanned (one level, or recursively up
// to a depth limit) for names matching the accepted attachment patterns.
//
// Per-entry I/O errors are non-fatal and collected as warnings (Rule 11).

use crate::util::constants;
use std::path::{Path, PathBuf};

/// Attachment files found under `paths`, in a stable order, plus warnings.
pub fn collect_attachments(
    paths: &[PathBuf],
    recursive: bool,
    max_depth: usize,
) -> (Vec<PathBuf>, Vec<String>) {
    let patterns = compile_patterns(constants::ACCEPTED_ATTACHMENT_PATTERNS);
    let mut files = Vec::new();
    let mut warnings = Vec::new();

    for path in paths {
        if path.is_dir() {
            let depth = if recursive { max_depth.max(1) } else { 1 };
            let before = files.len();
            scan_dir(path, depth, &patterns, &mut files, &mut warnings);
            tracing::debug!(
                dir = %path.display(),
                depth,
                found = files.len() - before,
                "Scanned directory for attachments"
            );
        } else if path.exists() {
            files.push(path.clone());
        } else {
            warnings.push(format!("'{}' does not exist", path.display()));
        }
    }

    (files, warnings)
}

fn scan_dir(
    root: &Path,
    max_depth: usize,
    patterns: &[glob::Pattern],
    files: &mut Vec<PathBuf>,
    warnings: &mut Vec<String>,
) {
    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name();

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                warnings.push(format!("Cannot access '{path_str}': {e}"));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match entry.file_name().to_str() {
            Some(name) if is_accepted(name, patterns) => files.push(entry.into_path()),
            Some(name) => tracing::trace!(file = name, "Not an attachment name"),
            None => warnings.push(format!(
                "Skipping '{}': non-UTF-8 filename",
                entry.path().display()
            )),
        }
    }
}

/// Compile glob patterns once; invalid ones are logged and skipped.
fn compile_patterns(patterns: &[&str]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "Invalid glob pattern, skipping");
                None
            }
        })
        .collect()
}

fn is_accepted(file_name: &str, patterns: &[glob::Pattern]) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };
    patterns.iter().any(|p| p.matches_with(file_name, options))
}
