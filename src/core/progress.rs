//! Live progress streaming for a single job.
//!
//! The publisher samples the registry on a fixed interval and forwards a
//! snapshot only when it differs from the last one sent. The stream ends with
//! the first terminal snapshot, or with a single error event if the job
//! disappears. Observing a job never blocks it, and a subscriber going away
//! only stops the stream; it does not abort the job.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::models::JobState;
use super::registry::JobRegistry;

/// Capacity of the per-subscriber channel.
const CHANNEL_CAPACITY: usize = 32;

/// One message on a progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Snapshot(Box<JobState>),
    Error { error: String },
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        match self {
            ProgressEvent::Snapshot(job) => job.status.is_terminal(),
            ProgressEvent::Error { .. } => true,
        }
    }
}

#[derive(Clone)]
pub struct ProgressPublisher {
    registry: JobRegistry,
    interval: Duration,
}

impl ProgressPublisher {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

    pub fn new(registry: JobRegistry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Spawn a publishing task for `job_id` and hand back its receiving end.
    pub fn subscribe(&self, job_id: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let publisher = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move { publisher.publish(&job_id, tx).await });
        rx
    }

    /// Drive the sampling loop until the job is terminal or `tx` is closed.
    pub async fn publish(&self, job_id: &str, tx: mpsc::Sender<ProgressEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<JobState> = None;

        loop {
            ticker.tick().await;

            if tx.is_closed() {
                debug!(job_id = %job_id, "Progress subscriber disconnected");
                return;
            }

            let Some(job) = self.registry.get(job_id) else {
                let _ = tx
                    .send(ProgressEvent::Error {
                        error: "Job not found".to_string(),
                    })
                    .await;
                return;
            };

            let terminal = job.status.is_terminal();
            if last.as_ref() != Some(&job) {
                last = Some(job.clone());
                if tx.send(ProgressEvent::Snapshot(Box::new(job))).await.is_err() {
                    debug!(job_id = %job_id, "Progress subscriber disconnected");
                    return;
                }
            }

            if terminal {
                return;
            }
        }
    }
}
