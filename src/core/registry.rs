//! In-memory registry of job state and abort flags.
//!
//! The registry is the single shared mutable resource between the caller that
//! submits a job, the worker executing it, and any observers streaming its
//! progress. One mutex guards both the job table and the abort-flag table.
//! Critical sections are plain in-memory reads and writes; no I/O happens while
//! the lock is held, so it is safe to call from async tasks and blocking
//! workers alike.
//!
//! Nothing here is persisted. Jobs live for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::models::{JobResult, JobState, JobStatus};

/// Thread-safe store for every job created in this process.
///
/// Cloning is cheap and yields a handle to the same underlying tables.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    jobs: HashMap<String, JobState>,
    abort_flags: HashMap<String, bool>,
    order: Vec<String>,
}

/// `round(current / total * 100)`, or 0 when there is nothing to count.
pub fn percentage(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Sections never leave the tables half-written, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending job and return its id.
    pub fn create(&self, job_type: &str) -> String {
        let id = Uuid::now_v7().to_string();
        let state = JobState {
            id: id.clone(),
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            current: 0,
            total: 0,
            current_file: String::new(),
            message: "Initializing...".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            result: None,
        };

        let mut tables = self.lock();
        tables.jobs.insert(id.clone(), state);
        tables.abort_flags.insert(id.clone(), false);
        tables.order.push(id.clone());
        drop(tables);

        debug!(job_id = %id, job_type, "Job created");
        id
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Snapshot of every job, in creation order.
    pub fn list(&self) -> Vec<JobState> {
        let tables = self.lock();
        tables
            .order
            .iter()
            .filter_map(|id| tables.jobs.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.lock()
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    /// Pending -> Running. Returns false if the job is unknown or not pending.
    pub fn start(&self, job_id: &str, total: u64) -> bool {
        let mut tables = self.lock();
        let Some(job) = tables.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        job.status = JobStatus::Running;
        job.total = total;
        job.message = "Processing...".to_string();
        true
    }

    /// Record progress for a running job.
    ///
    /// Updates for jobs that are not running (not yet started, or already
    /// terminal) are dropped without error.
    pub fn update_progress(
        &self,
        job_id: &str,
        current: u64,
        total: u64,
        message: &str,
        current_file: &str,
    ) -> bool {
        let mut tables = self.lock();
        let Some(job) = tables.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            return false;
        }
        job.current = current;
        job.total = total;
        job.progress = percentage(current, total);
        job.message = message.to_string();
        job.current_file = current_file.to_string();
        true
    }

    /// Running -> Completed.
    pub fn complete(&self, job_id: &str, result: JobResult) -> bool {
        let mut tables = self.lock();
        let Some(job) = tables.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            return false;
        }
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        job.message = "Completed successfully".to_string();
        job.result = Some(result);
        true
    }

    /// Pending or Running -> Failed.
    pub fn fail(&self, job_id: &str, error: &str) -> bool {
        let mut tables = self.lock();
        let Some(job) = tables.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.message = format!("Failed: {}", error);
        job.result = Some(JobResult::Error {
            error: error.to_string(),
        });
        true
    }

    /// Latch the abort flag. Returns whether the job exists.
    ///
    /// The status is left alone; the worker notices the flag at its next
    /// checkpoint and calls [`JobRegistry::mark_aborted`].
    pub fn request_abort(&self, job_id: &str) -> bool {
        let mut tables = self.lock();
        let Some(flag) = tables.abort_flags.get_mut(job_id) else {
            return false;
        };
        *flag = true;
        if let Some(job) = tables.jobs.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.message = "Abort requested...".to_string();
            }
        }
        true
    }

    pub fn is_aborted(&self, job_id: &str) -> bool {
        self.lock().abort_flags.get(job_id).copied().unwrap_or(false)
    }

    /// Running -> Aborted, keeping whatever partial result the worker had.
    pub fn mark_aborted(&self, job_id: &str, partial: JobResult) -> bool {
        let mut tables = self.lock();
        let Some(job) = tables.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            return false;
        }
        job.status = JobStatus::Aborted;
        job.completed_at = Some(Utc::now());
        job.message = "Operation aborted by user".to_string();
        job.result = Some(partial);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn done() -> JobResult {
        JobResult::Document(serde_json::json!({ "ok": true }))
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(!registry.request_abort("nope"));
        assert!(!registry.is_aborted("nope"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_create_registers_pending_job() {
        let registry = JobRegistry::new();
        let id = registry.create("organize_types");

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, "organize_types");
        assert_eq!(job.progress, 0);
        assert!(job.completed_at.is_none());
        assert!(job.result.is_none());
        assert!(!registry.is_aborted(&id));
    }

    #[test]
    fn test_progress_follows_rounded_percentage() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        assert!(registry.start(&id, 3));
        assert_eq!(registry.get(&id).unwrap().message, "Processing...");

        let mut last = 0;
        for current in 1..=3 {
            assert!(registry.update_progress(&id, current, 3, "Working", "f.txt"));
            let job = registry.get(&id).unwrap();
            assert_eq!(job.progress, percentage(current, 3));
            assert!(job.progress >= last);
            last = job.progress;
        }
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(last, 100);

        assert!(registry.complete(&id, done()));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_zero_total_reports_zero_percent() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        registry.start(&id, 0);
        registry.update_progress(&id, 5, 0, "Scanning", "");
        assert_eq!(registry.get(&id).unwrap().progress, 0);
    }

    #[test]
    fn test_update_before_start_is_dropped() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");

        assert!(!registry.update_progress(&id, 1, 2, "early", "a"));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.current, 0);
        assert_eq!(job.message, "Initializing...");
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        registry.start(&id, 10);
        registry.update_progress(&id, 4, 10, "Working", "d.txt");
        registry.fail(&id, "disk on fire");

        let before = registry.get(&id).unwrap();
        assert!(!registry.update_progress(&id, 9, 10, "late", "z.txt"));
        assert!(!registry.complete(&id, done()));
        assert!(!registry.mark_aborted(&id, done()));
        assert!(!registry.fail(&id, "again"));
        assert!(!registry.start(&id, 1));

        let after = registry.get(&id).unwrap();
        assert_eq!(before, after);
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(
            after.result,
            Some(JobResult::Error {
                error: "disk on fire".to_string()
            })
        );
    }

    #[test]
    fn test_fail_from_pending() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");

        assert!(registry.fail(&id, "Source directory not found"));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.message, "Failed: Source directory not found");
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_complete_requires_running() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        assert!(!registry.complete(&id, done()));
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_abort_latch_does_not_change_status() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        registry.start(&id, 2);

        assert!(registry.request_abort(&id));
        assert!(registry.is_aborted(&id));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.message, "Abort requested...");

        // Latch stays set
        assert!(registry.request_abort(&id));
        assert!(registry.is_aborted(&id));

        assert!(registry.mark_aborted(&id, done()));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Aborted);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_abort_after_terminal_keeps_message() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        registry.start(&id, 0);
        registry.complete(&id, done());

        assert!(registry.request_abort(&id));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.message, "Completed successfully");
    }

    #[test]
    fn test_completed_at_is_stamped_once() {
        let registry = JobRegistry::new();
        let id = registry.create("batch");
        registry.start(&id, 1);
        registry.complete(&id, done());
        let stamped = registry.get(&id).unwrap().completed_at;

        registry.fail(&id, "late failure");
        registry.mark_aborted(&id, done());
        assert_eq!(registry.get(&id).unwrap().completed_at, stamped);
    }

    #[test]
    fn test_concurrent_creates_yield_distinct_ids() {
        let registry = JobRegistry::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| registry.create("concurrent"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id), "duplicate job id");
            }
        }

        assert_eq!(ids.len(), 400);
        assert_eq!(registry.list().len(), 400);
        assert_eq!(registry.active_count(), 400);
    }

    #[test]
    fn test_list_preserves_creation_order() {
        let registry = JobRegistry::new();
        let a = registry.create("a");
        let b = registry.create("b");
        let c = registry.create("c");

        let ids: Vec<_> = registry.list().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }
}
