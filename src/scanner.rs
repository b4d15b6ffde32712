use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use indicatif::{HumanBytes, HumanCount, ProgressBar};
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::record::FileRecord;

/// Which files the catalog admits. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Allowed extensions with a leading dot, e.g. `.tar.gz`.
    pub extensions: Vec<String>,
}

/// Zero-byte files never pass.
pub fn size_pass(size: u64, min_size: Option<u64>, max_size: Option<u64>) -> bool {
    if size == 0 {
        return false;
    }
    if min_size.is_some_and(|min| size < min) {
        return false;
    }
    if max_size.is_some_and(|max| size > max) {
        return false;
    }
    true
}

/// Matches the file name against `extensions`, case-insensitively.
///
/// Every dotted suffix of the name is tried, so `archive.tar.gz` passes for
/// both `.tar.gz` and `.gz`. With a filter in place, hidden files and files
/// without an extension are rejected.
pub fn extension_pass(file_name: &str, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    if file_name.starts_with('.') {
        return false;
    }

    let parts: Vec<&str> = file_name.split('.').collect();
    (1..parts.len()).any(|i| {
        let candidate = format!(".{}", parts[i..].join("."));
        extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&candidate))
    })
}

/// Largest files first.
pub fn sort_by_size_desc(files: &mut [FileRecord]) {
    files.sort_by(|a, b| b.size.cmp(&a.size));
}

/// Walks `root` and returns the readable regular files that pass `filters`,
/// sorted by descending size.
pub fn scan_directory(root: &Path, filters: &Filters) -> Result<Vec<FileRecord>> {
    if !root.exists() {
        bail!("Path does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Path is not a directory: {}", root.display());
    }

    info!("Scanning {}", root.display());
    let pb = ProgressBar::new_spinner();
    pb.set_message("Scanning files and directories...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut files = Vec::new();
    let mut total_files = 0u64;
    let mut total_dirs = 0u64;
    let mut kept_size = 0u64;

    for entry in WalkDir::new(root) {
        pb.tick();
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Can't access directory entry: {}", e);
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            total_dirs += 1;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        total_files += 1;

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        if !extension_pass(&file_name, &filters.extensions) {
            continue;
        }
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Can't get size of '{}': {}", path.display(), e);
                continue;
            }
        };
        if !size_pass(size, filters.min_size, filters.max_size) {
            continue;
        }
        // Only files that passed every filter are opened.
        if let Err(e) = fs::File::open(path) {
            debug!("Skipping unreadable '{}': {}", path.display(), e);
            continue;
        }

        kept_size += size;
        files.push(FileRecord::new(path, size));
        pb.set_message(format!("Scanning files... {} matched", files.len()));
    }
    pb.finish_and_clear();

    info!(
        "Found {} files and {} directories, {} files matched ({})",
        HumanCount(total_files),
        HumanCount(total_dirs),
        HumanCount(files.len() as u64),
        HumanBytes(kept_size)
    );

    sort_by_size_desc(&mut files);
    Ok(files)
}
