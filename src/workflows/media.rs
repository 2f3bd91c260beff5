use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::core::{ClassificationPolicy, FileEntry, Placement};

const MEDIA_EXTENSIONS: &[&str] = &[
    // Photos
    ".heic", ".jpg", ".jpeg", ".dng", ".webp",
    // Videos
    ".mov", ".mp4", ".avi", ".3gp", ".mkv", ".webm",
    // Misc and raw
    ".gif", ".png", ".arw", ".cr2", ".nef",
];

/// Holding folder for files without a usable modification time.
const UNKNOWN_DATE: &str = "Unknown_Date";
const DATE_FAILED: &str = "Date extraction failed";

static DATE_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)\d{2}-?(0[1-9]|1[0-2])$").expect("static pattern"));

fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

/// Photos and videos into `YYYY-MM` folders, screenshots into `Screenshots`.
pub struct MediaByDate {
    dest: PathBuf,
}

impl MediaByDate {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

impl ClassificationPolicy for MediaByDate {
    fn job_type(&self) -> &'static str {
        "organize_media"
    }

    fn progress_label(&self) -> &str {
        "Organizing media by date..."
    }

    fn classify(&self, entry: &FileEntry) -> Option<Placement> {
        let ext = entry.extension();
        if !MEDIA_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }

        if entry.file_name().to_lowercase().contains("screenshot") || ext == ".png" {
            return Some(Placement::new(self.dest.join("Screenshots"), "Screenshot detected"));
        }

        match entry.modified {
            Some(modified) => {
                let month = local_time(modified).format("%Y-%m").to_string();
                let reason = format!("Media File ({})", month);
                Some(Placement::new(self.dest.join(month), reason))
            }
            None => Some(Placement::new(self.dest.join(UNKNOWN_DATE), DATE_FAILED)),
        }
    }
}

/// Files sitting directly in `root/YYYY-MM` folders into `DD` subfolders.
pub struct DaySubfolders {
    root: PathBuf,
}

impl DaySubfolders {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_month_folder(&self, dir: &Path) -> bool {
        dir.parent() == Some(self.root.as_path())
            && dir
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| DATE_FOLDER.is_match(n))
    }
}

impl ClassificationPolicy for DaySubfolders {
    fn job_type(&self) -> &'static str {
        "organize_subfolders"
    }

    fn progress_label(&self) -> &str {
        "Splitting month folders by day..."
    }

    fn classify(&self, entry: &FileEntry) -> Option<Placement> {
        let folder = entry.path.parent()?;
        if !self.is_month_folder(folder) || entry.file_name().starts_with('.') {
            return None;
        }

        let Some(modified) = entry.modified else {
            return Some(Placement::new(folder.join(UNKNOWN_DATE), DATE_FAILED));
        };
        let day = local_time(modified).format("%d").to_string();
        let reason = format!("Day {}", day);
        Some(Placement::new(folder.join(day), reason))
    }
}
