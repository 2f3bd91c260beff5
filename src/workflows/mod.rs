//! Concrete workflows built on the batch orchestrator.
//!
//! Each file-moving workflow is a [`ClassificationPolicy`]; the extension
//! report is a non-moving job that shares the same lifecycle.

pub mod android;
pub mod extensions;
pub mod media;
pub mod types;

use std::path::PathBuf;

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::AppContext;
use crate::core::{BatchOptions, ClassificationPolicy, JobHandle, WorkOrchestrator};

pub use android::AndroidCleanup;
pub use media::{DaySubfolders, MediaByDate};
pub use types::{ByType, CollectPdfs};

/// A workflow and the directories it operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Subcommand)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum Workflow {
    /// Sort photos and videos into YYYY-MM folders
    MediaByDate { source: PathBuf, dest: PathBuf },
    /// Split YYYY-MM folders into per-day subfolders
    DaySubfolders { root: PathBuf },
    /// Group installers and archives by type
    ByType { source: PathBuf, dest: PathBuf },
    /// Collect every PDF into one folder
    CollectPdfs { source: PathBuf, dest: PathBuf },
    /// Quarantine cache and junk files in an Android backup
    AndroidCleanup {
        source: PathBuf,
        /// Size in MB above which an extensionless file counts as cache
        #[arg(long)]
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold_mb: Option<u64>,
    },
    /// Count files and bytes per extension
    Extensions { source: PathBuf },
}

impl Workflow {
    /// Root directory the workflow scans.
    pub fn source(&self) -> &PathBuf {
        match self {
            Workflow::MediaByDate { source, .. }
            | Workflow::ByType { source, .. }
            | Workflow::CollectPdfs { source, .. }
            | Workflow::AndroidCleanup { source, .. }
            | Workflow::Extensions { source } => source,
            Workflow::DaySubfolders { root } => root,
        }
    }

    /// The classification policy for file-moving workflows, None for the
    /// extension report.
    pub fn policy(&self, default_threshold_mb: u64) -> Option<Box<dyn ClassificationPolicy>> {
        let policy: Box<dyn ClassificationPolicy> = match self {
            Workflow::MediaByDate { dest, .. } => Box::new(MediaByDate::new(dest)),
            Workflow::DaySubfolders { root } => Box::new(DaySubfolders::new(root)),
            Workflow::ByType { dest, .. } => Box::new(ByType::new(dest)),
            Workflow::CollectPdfs { dest, .. } => Box::new(CollectPdfs::new(dest)),
            Workflow::AndroidCleanup { source, threshold_mb } => Box::new(AndroidCleanup::new(
                source,
                threshold_mb.unwrap_or(default_threshold_mb),
            )),
            Workflow::Extensions { .. } => return None,
        };
        Some(policy)
    }
}

fn default_dry_run() -> bool {
    true
}

/// A request to start a workflow, as accepted over RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(flatten)]
    pub workflow: Workflow,
    /// Plan and report without touching the filesystem. On unless the
    /// caller explicitly turns it off.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Overrides the configured default when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_mode: Option<bool>,
}

impl WorkflowRequest {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            dry_run: default_dry_run(),
            safe_mode: None,
        }
    }
}

/// Start `request` on the context's job runner.
pub fn submit(ctx: &AppContext, request: WorkflowRequest) -> JobHandle {
    let opts = BatchOptions {
        dry_run: request.dry_run,
        safe_mode: request.safe_mode.unwrap_or(ctx.config.safe_mode),
    };
    let source = request.workflow.source().clone();

    let Some(policy) = request.workflow.policy(ctx.config.android_threshold_mb) else {
        let registry = ctx.registry.clone();
        let handle = ctx.runner.submit(extensions::JOB_TYPE, move |job_id| {
            extensions::analyze(&registry, job_id, &source)?;
            Ok(())
        });
        info!(job_id = %handle.id, source = %request.workflow.source().display(), "Extension report started");
        return handle;
    };

    let orchestrator = WorkOrchestrator::new(ctx.registry.clone(), ctx.engine.clone());
    let handle = ctx.runner.submit(policy.job_type(), move |job_id| {
        orchestrator.run(job_id, &source, policy.as_ref(), opts);
        Ok(())
    });
    info!(
        job_id = %handle.id,
        source = %request.workflow.source().display(),
        dry_run = opts.dry_run,
        safe = opts.safe_mode,
        "Workflow started"
    );
    handle
}
