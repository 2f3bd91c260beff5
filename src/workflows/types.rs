use std::path::{Component, PathBuf};

use crate::core::{ClassificationPolicy, FileEntry, Placement};

const FILE_CATEGORIES: &[(&str, &[&str])] = &[
    ("Software Installers", &[".exe", ".msi", ".iso"]),
    ("Archives", &[".zip", ".rar", ".7z", ".gz", ".tgz"]),
];

/// System folders never searched for PDFs.
const SKIP_DIRS: &[&str] = &[
    "Windows",
    "Program Files",
    "Program Files (x86)",
    "$Recycle.Bin",
    "System Volume Information",
    "AppData",
];

/// Installers and archives into per-category folders.
pub struct ByType {
    dest: PathBuf,
}

impl ByType {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

fn category_for(entry: &FileEntry) -> Option<&'static str> {
    if entry.file_name().to_lowercase().ends_with(".tar.gz") {
        return Some("Archives");
    }
    let ext = entry.extension();
    FILE_CATEGORIES
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(category, _)| *category)
}

impl ClassificationPolicy for ByType {
    fn job_type(&self) -> &'static str {
        "organize_types"
    }

    fn progress_label(&self) -> &str {
        "Organizing files by type..."
    }

    fn classify(&self, entry: &FileEntry) -> Option<Placement> {
        let category = category_for(entry)?;
        Some(Placement::new(self.dest.join(category), category))
    }
}

/// Every PDF outside system folders into a single directory.
pub struct CollectPdfs {
    dest: PathBuf,
}

impl CollectPdfs {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

impl ClassificationPolicy for CollectPdfs {
    fn job_type(&self) -> &'static str {
        "collect_pdfs"
    }

    fn progress_label(&self) -> &str {
        "Collecting PDFs..."
    }

    fn classify(&self, entry: &FileEntry) -> Option<Placement> {
        if entry.extension() != ".pdf" {
            return None;
        }
        let in_system_dir = entry.path.components().any(|c| match c {
            Component::Normal(part) => part.to_str().is_some_and(|p| SKIP_DIRS.contains(&p)),
            _ => false,
        });
        if in_system_dir {
            return None;
        }
        Some(Placement::new(&self.dest, "Consolidate PDF"))
    }
}
