use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

/// A regular file discovered while scanning a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    /// None when the platform cannot report a modification time.
    pub modified: Option<SystemTime>,
}

impl FileEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension including the leading dot, or "" when absent.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}

/// Recursively collect every regular file under `root`, sorted by path.
///
/// Symlinks and special files are skipped. Failing to read `root` itself is an
/// error; unreadable entries and subdirectories below it are logged and
/// skipped.
pub fn scan_directory(root: &Path) -> io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(root)?;
    scan_entries(entries, &mut files);
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn scan_entries(entries: fs::ReadDir, files: &mut Vec<FileEntry>) {
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();

        // symlink_metadata so links are never followed
        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            match fs::read_dir(&path) {
                Ok(children) => scan_entries(children, files),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable directory"),
            }
        } else if metadata.is_file() {
            files.push(FileEntry {
                modified: metadata.modified().ok(),
                size: metadata.len(),
                path,
            });
        }
    }
}
