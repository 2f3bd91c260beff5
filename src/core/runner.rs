//! Supervised execution of blocking job bodies.
//!
//! Every job submitted here is guaranteed to reach a terminal state: the
//! supervising task fails the job if its body returns an error, panics, or
//! returns without resolving it.

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::registry::JobRegistry;

/// Handle to a submitted job.
pub struct JobHandle {
    pub id: String,
    join: JoinHandle<()>,
}

impl JobHandle {
    /// Wait until the supervisor has resolved the job.
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!(job_id = %self.id, error = %e, "Job supervisor task failed");
        }
    }
}

#[derive(Clone)]
pub struct JobRunner {
    registry: JobRegistry,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Create a job and run `work` for it on the blocking pool.
    ///
    /// `work` receives the job id and is expected to drive the job to a
    /// terminal state through the registry.
    pub fn submit<F>(&self, job_type: &str, work: F) -> JobHandle
    where
        F: FnOnce(&str) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.registry.create(job_type);
        let registry = self.registry.clone();
        let job_id = id.clone();

        let join = self.tracker.spawn(async move {
            let worker_id = job_id.clone();
            let outcome = tokio::task::spawn_blocking(move || work(&worker_id)).await;

            match outcome {
                Ok(Ok(())) => {
                    let unresolved = registry
                        .get(&job_id)
                        .is_some_and(|job| !job.status.is_terminal());
                    if unresolved {
                        warn!(job_id = %job_id, "Worker exited without resolving job");
                        registry.fail(&job_id, "Worker exited without resolving job");
                    }
                }
                Ok(Err(e)) => {
                    warn!(job_id = %job_id, error = %e, "Job failed");
                    registry.fail(&job_id, &format!("{:#}", e));
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Job worker crashed");
                    registry.fail(&job_id, &format!("Worker crashed: {}", e));
                }
            }
        });

        info!(job_id = %id, job_type, "Job submitted");
        JobHandle { id, join }
    }

    /// Number of supervised jobs still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every in-flight job to be resolved.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{JobResult, JobStatus};

    #[tokio::test]
    async fn test_successful_work_keeps_its_result() {
        let runner = JobRunner::new(JobRegistry::new());
        let registry = runner.registry().clone();

        let handle = runner.submit("noop", move |id| {
            registry.start(id, 0);
            registry.complete(id, JobResult::Document(serde_json::json!({ "done": true })));
            Ok(())
        });
        let id = handle.id.clone();
        handle.wait().await;

        let job = runner.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_error_fails_job() {
        let runner = JobRunner::new(JobRegistry::new());
        let handle = runner.submit("broken", |_| Err(anyhow::anyhow!("root unreadable")));
        let id = handle.id.clone();
        handle.wait().await;

        let job = runner.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.message, "Failed: root unreadable");
    }

    #[tokio::test]
    async fn test_panic_fails_job() {
        let runner = JobRunner::new(JobRegistry::new());
        let registry = runner.registry().clone();
        let handle = runner.submit("panics", move |id| {
            registry.start(id, 5);
            panic!("worker blew up");
        });
        let id = handle.id.clone();
        handle.wait().await;

        let job = runner.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.message.contains("Worker crashed"));
    }

    #[tokio::test]
    async fn test_unresolved_job_is_failed() {
        let runner = JobRunner::new(JobRegistry::new());
        let registry = runner.registry().clone();
        let handle = runner.submit("forgetful", move |id| {
            registry.start(id, 1);
            Ok(())
        });
        let id = handle.id.clone();
        handle.wait().await;

        let job = runner.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.result,
            Some(JobResult::Error {
                error: "Worker exited without resolving job".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_jobs() {
        let runner = JobRunner::new(JobRegistry::new());
        let registry = runner.registry().clone();
        let handle = runner.submit("slow", move |id| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            registry.start(id, 0);
            registry.complete(id, JobResult::Document(serde_json::Value::Null));
            Ok(())
        });
        let id = handle.id.clone();

        runner.shutdown().await;
        assert_eq!(runner.in_flight(), 0);
        assert_eq!(runner.registry().get(&id).unwrap().status, JobStatus::Completed);
    }
}
