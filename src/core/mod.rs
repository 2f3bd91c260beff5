pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod scanner;
pub mod transfer_engine;
pub mod verifier;

pub use models::{BatchSummary, ExtensionReport, JobResult, JobState, JobStatus, TransferRecord};
pub use orchestrator::{BatchOptions, BatchOutcome, ClassificationPolicy, Placement, WorkOrchestrator};
pub use progress::{ProgressEvent, ProgressPublisher};
pub use registry::JobRegistry;
pub use runner::{JobHandle, JobRunner};
pub use scanner::FileEntry;
pub use transfer_engine::{MoveOptions, TransferEngine};
pub use verifier::ChecksumAlgorithm;
