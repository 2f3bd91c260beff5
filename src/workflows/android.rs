use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::{ClassificationPolicy, FileEntry, Placement};

const WHATSAPP_DIR: &str = "_whatsapp_backup";
const LARGE_CACHE_DIR: &str = "_suspected_cache";
const JUNK_CACHE_DIR: &str = "_junk_cache";

const JUNK_EXTENSIONS: &[&str] = &[".tmp", ".log", ".chck", ".pcm", ".clean", ".exo", ".bkup", ".swatch"];
const PROTECTED_EXTENSIONS: &[&str] = &[".doc", ".docx", ".pdf", ".jpg", ".png", ".mp4", ".apk", ".xlsx", ".pptx"];

static WHATSAPP_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)^.*\.crypt\d+$").expect("static pattern"),
        Regex::new(r"(?i)^msgstore.*\.db.*$").expect("static pattern"),
    ]
});

static JUNK_NAME_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^\d+$").expect("static pattern"),
        Regex::new(r"^[a-fA-F0-9]+$").expect("static pattern"),
        Regex::new(r"^\..+").expect("static pattern"),
    ]
});

/// Heuristic cleanup of an Android backup dump.
///
/// Moves WhatsApp database backups, files with throwaway extensions, and
/// extensionless blobs that look like app caches into holding folders under
/// the backup root. Nothing is deleted.
pub struct AndroidCleanup {
    root: PathBuf,
    threshold_mb: u64,
}

impl AndroidCleanup {
    pub fn new(root: impl Into<PathBuf>, threshold_mb: u64) -> Self {
        Self {
            root: root.into(),
            threshold_mb,
        }
    }

    fn threshold_bytes(&self) -> u64 {
        self.threshold_mb.saturating_mul(1024 * 1024)
    }

    fn already_sorted(&self, entry: &FileEntry) -> bool {
        let Ok(relative) = entry.path.strip_prefix(&self.root) else {
            return false;
        };
        relative.parent().is_some_and(|dir| {
            dir.components().any(|c| {
                let part = c.as_os_str();
                part == WHATSAPP_DIR || part == LARGE_CACHE_DIR || part == JUNK_CACHE_DIR
            })
        })
    }
}

impl ClassificationPolicy for AndroidCleanup {
    fn job_type(&self) -> &'static str {
        "android_cleanup"
    }

    fn progress_label(&self) -> &str {
        "Cleaning Android backup..."
    }

    fn classify(&self, entry: &FileEntry) -> Option<Placement> {
        if self.already_sorted(entry) {
            return None;
        }

        let ext = entry.extension();
        if PROTECTED_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }

        let name = entry.file_name();
        if WHATSAPP_PATTERNS.iter().any(|re| re.is_match(&name)) {
            return Some(Placement::new(self.root.join(WHATSAPP_DIR), "WhatsApp Backup"));
        }

        if JUNK_EXTENSIONS.contains(&ext.as_str()) {
            return Some(Placement::new(
                self.root.join(JUNK_CACHE_DIR),
                format!("Junk Extension {}", ext),
            ));
        }

        if !ext.is_empty() {
            return None;
        }

        if entry.size >= self.threshold_bytes() {
            return Some(Placement::new(
                self.root.join(LARGE_CACHE_DIR),
                format!("Large No-Ext File (> {}MB)", self.threshold_mb),
            ));
        }

        let junk_name = JUNK_NAME_PATTERNS.iter().any(|re| re.is_match(&name))
            || name.to_lowercase().contains("thumbdata");
        junk_name.then(|| Placement::new(self.root.join(JUNK_CACHE_DIR), "Junk Name Pattern"))
    }
}
