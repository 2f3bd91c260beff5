//! Extension statistics over a directory tree.
//!
//! Moves nothing. Runs under the same job contract as the batch workflows so
//! it can be watched and aborted the same way.

use std::path::Path;

use tracing::{info, info_span};

use crate::core::JobRegistry;
use crate::core::models::{ExtensionReport, JobResult};
use crate::core::orchestrator::OrchestratorError;
use crate::core::scanner::scan_directory;

pub const JOB_TYPE: &str = "extensions_report";

const NO_EXTENSION: &str = "No Extension";
const PROGRESS_EVERY: u64 = 100;

/// Tally file counts and sizes per extension under `source`.
///
/// Drives `job_id` to a terminal state. Setup failures fail the job and are
/// also returned to the caller.
pub fn analyze(registry: &JobRegistry, job_id: &str, source: &Path) -> Result<ExtensionReport, OrchestratorError> {
    let span = info_span!("extensions", job_id = %job_id);
    let _guard = span.enter();

    let entries = if source.is_dir() {
        scan_directory(source).map_err(|e| OrchestratorError::Scan {
            path: source.to_path_buf(),
            source: e,
        })
    } else {
        Err(OrchestratorError::SourceNotFound(source.to_path_buf()))
    };
    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            registry.fail(job_id, &e.to_string());
            return Err(e);
        }
    };

    let total = entries.len() as u64;
    registry.start(job_id, total);
    info!(root = %source.display(), total, "Analyzing extensions");

    let mut report = ExtensionReport::default();
    for (index, entry) in entries.iter().enumerate() {
        if registry.is_aborted(job_id) {
            report.aborted = true;
            info!(processed = index, total, "Analysis aborted");
            registry.mark_aborted(job_id, JobResult::Extensions(report.clone()));
            return Ok(report);
        }

        let ext = entry.extension();
        let key = if ext.is_empty() { NO_EXTENSION.to_string() } else { ext };
        *report.counts.entry(key.clone()).or_default() += 1;
        *report.sizes.entry(key).or_default() += entry.size;
        report.files += 1;

        let current = index as u64 + 1;
        if current % PROGRESS_EVERY == 0 || current == total {
            registry.update_progress(job_id, current, total, "Scanning files...", &entry.file_name());
        }
    }

    info!(files = report.files, extensions = report.counts.len(), "Analysis complete");
    registry.complete(job_id, JobResult::Extensions(report.clone()));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobStatus;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_counts_and_sizes_by_extension() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.JPG"), b"1234").unwrap();
        fs::write(temp.path().join("b.jpg"), b"12").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/notes.txt"), b"hello").unwrap();
        fs::write(temp.path().join("sub/Makefile"), b"all:").unwrap();

        let registry = JobRegistry::new();
        let job_id = registry.create(JOB_TYPE);
        let report = analyze(&registry, &job_id, temp.path()).unwrap();

        assert_eq!(report.files, 4);
        assert_eq!(report.counts[".jpg"], 2);
        assert_eq!(report.sizes[".jpg"], 6);
        assert_eq!(report.counts[".txt"], 1);
        assert_eq!(report.counts[NO_EXTENSION], 1);
        assert!(!report.aborted);

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.current, 4);
        assert_eq!(job.result, Some(JobResult::Extensions(report)));
    }

    #[test]
    fn test_missing_source_fails_job() {
        let temp = tempdir().unwrap();
        let registry = JobRegistry::new();
        let job_id = registry.create(JOB_TYPE);

        let err = analyze(&registry, &job_id, &temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, OrchestratorError::SourceNotFound(_)));

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.message.starts_with("Failed: Source directory not found"));
    }

    #[test]
    fn test_abort_keeps_partial_report() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let registry = JobRegistry::new();
        let job_id = registry.create(JOB_TYPE);
        registry.request_abort(&job_id);

        let report = analyze(&registry, &job_id, temp.path()).unwrap();
        assert!(report.aborted);
        assert_eq!(report.files, 0);
        assert_eq!(registry.get(&job_id).unwrap().status, JobStatus::Aborted);
    }
}
