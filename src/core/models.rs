use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a job, as handed to readers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current: u64,
    pub total: u64,
    pub current_file: String,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

/// Terminal payload of a job.
///
/// Serialized untagged, so clients see a plain document whose shape depends
/// on the workflow that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Batch(BatchSummary),
    Extensions(ExtensionReport),
    Error { error: String },
    Document(serde_json::Value),
}

/// Aggregated outcome of a batch of transfers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub moved: u64,
    pub skipped: u64,
    pub errors: u64,
    pub processed: u64,
    pub total: u64,
    pub dry_run: bool,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub details: Vec<TransferRecord>,
}

impl BatchSummary {
    pub fn new(total: u64, dry_run: bool) -> Self {
        Self {
            total,
            dry_run,
            ..Default::default()
        }
    }

    /// Tally one transfer outcome. Dry-run records count as moved.
    pub fn record(&mut self, record: TransferRecord) {
        match record.status {
            TransferStatus::Moved | TransferStatus::DryRun => self.moved += 1,
            TransferStatus::Skipped => self.skipped += 1,
            TransferStatus::Error => self.errors += 1,
        }
        self.processed += 1;
        self.details.push(record);
    }
}

/// Extension statistics gathered by the analysis workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionReport {
    pub counts: BTreeMap<String, u64>,
    pub sizes: BTreeMap<String, u64>,
    pub files: u64,
    pub aborted: bool,
}

/// Outcome of a single relocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Moved,
    DryRun,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Standard,
    SafeVerify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub status: TransferStatus,
    pub src: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_dir: Option<PathBuf>,
    pub reason: String,
    pub mode: TransferMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferRecord {
    pub fn new(status: TransferStatus, src: PathBuf, reason: impl Into<String>, mode: TransferMode) -> Self {
        Self {
            status,
            src,
            dest: None,
            dest_dir: None,
            reason: reason.into(),
            mode,
            error: None,
        }
    }

    pub fn with_dest(mut self, dest: PathBuf) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_dest_dir(mut self, dest_dir: PathBuf) -> Self {
        self.dest_dir = Some(dest_dir);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
