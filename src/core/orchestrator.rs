//! Plan-then-execute batch driver shared by every file-moving workflow.
//!
//! Workflows differ only in their [`ClassificationPolicy`]. The orchestrator
//! enumerates the full candidate list before touching anything, so `total` is
//! fixed for the rest of the run, then moves items one at a time. The abort
//! flag is polled once per item.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::logging::LogThrottle;

use super::models::{BatchSummary, JobResult};
use super::registry::JobRegistry;
use super::scanner::{FileEntry, scan_directory};
use super::transfer_engine::{MoveOptions, TransferEngine};

/// Where a file should go and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub dest_dir: PathBuf,
    pub reason: String,
}

impl Placement {
    pub fn new(dest_dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            reason: reason.into(),
        }
    }
}

/// Pure mapping from file metadata to an optional destination.
pub trait ClassificationPolicy: Send + Sync {
    /// Tag recorded on the job.
    fn job_type(&self) -> &'static str;

    /// Human label shown while the batch runs.
    fn progress_label(&self) -> &str;

    fn classify(&self, entry: &FileEntry) -> Option<Placement>;
}

/// A planned relocation.
#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub entry: FileEntry,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub safe_mode: bool,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How a batch ended.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Completed(BatchSummary),
    Aborted(BatchSummary),
    Failed(String),
}

pub struct WorkOrchestrator {
    registry: JobRegistry,
    engine: TransferEngine,
}

impl WorkOrchestrator {
    pub fn new(registry: JobRegistry, engine: TransferEngine) -> Self {
        Self { registry, engine }
    }

    /// Enumerate `root` and keep every file the policy places somewhere.
    pub fn plan(&self, root: &Path, policy: &dyn ClassificationPolicy) -> Result<Vec<PlannedMove>, OrchestratorError> {
        if !root.is_dir() {
            return Err(OrchestratorError::SourceNotFound(root.to_path_buf()));
        }

        let entries = scan_directory(root).map_err(|source| OrchestratorError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        let scanned = entries.len();

        let plan: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| {
                let placement = policy.classify(&entry)?;
                // Already where it belongs
                if entry.path.parent().map(resolved) == Some(resolved(&placement.dest_dir)) {
                    return None;
                }
                Some(PlannedMove { entry, placement })
            })
            .collect();

        debug!(root = %root.display(), scanned, planned = plan.len(), "Plan ready");
        Ok(plan)
    }

    /// Plan and execute a batch for an already created job.
    ///
    /// A setup failure fails the job without ever starting it.
    pub fn run(
        &self,
        job_id: &str,
        root: &Path,
        policy: &dyn ClassificationPolicy,
        opts: BatchOptions,
    ) -> BatchOutcome {
        let span = info_span!("batch", job_id = %job_id, job_type = policy.job_type());
        let _guard = span.enter();

        info!(root = %root.display(), dry_run = opts.dry_run, safe = opts.safe_mode, "Planning batch");

        let plan = match self.plan(root, policy) {
            Ok(plan) => plan,
            Err(e) => {
                let error = e.to_string();
                info!(error = %error, "Batch setup failed");
                self.registry.fail(job_id, &error);
                return BatchOutcome::Failed(error);
            }
        };

        self.execute(job_id, plan, policy.progress_label(), opts)
    }

    /// Move every planned item in order, honoring abort requests between items.
    pub fn execute(&self, job_id: &str, plan: Vec<PlannedMove>, label: &str, opts: BatchOptions) -> BatchOutcome {
        let total = plan.len() as u64;
        let message = if opts.dry_run {
            format!("[DRY RUN] {}", label)
        } else {
            label.to_string()
        };

        self.registry.start(job_id, total);
        info!(total, "Executing batch");

        let throttle = LogThrottle::new(Duration::from_millis(500));
        let mut summary = BatchSummary::new(total, opts.dry_run);

        for (index, item) in plan.into_iter().enumerate() {
            if self.registry.is_aborted(job_id) {
                summary.aborted = true;
                summary.message = Some(format!("Aborted after processing {} of {} files", index, total));
                info!(processed = index, total, "Batch aborted");
                self.registry
                    .mark_aborted(job_id, JobResult::Batch(summary.clone()));
                return BatchOutcome::Aborted(summary);
            }

            let move_opts = MoveOptions {
                dry_run: opts.dry_run,
                safe_mode: opts.safe_mode,
                reason: &item.placement.reason,
            };
            let record = self
                .engine
                .move_file(&item.entry.path, &item.placement.dest_dir, &move_opts);
            summary.record(record);

            let current = index as u64 + 1;
            let file_name = item.entry.file_name();
            self.registry
                .update_progress(job_id, current, total, &message, &file_name);

            if throttle.should_log() {
                debug!(current, total, file = %file_name, "Batch progress");
            }
        }

        info!(
            moved = summary.moved,
            skipped = summary.skipped,
            errors = summary.errors,
            "Batch complete"
        );
        self.registry
            .complete(job_id, JobResult::Batch(summary.clone()));
        BatchOutcome::Completed(summary)
    }
}

/// Symlinks and relative components resolved where the path exists.
fn resolved(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
