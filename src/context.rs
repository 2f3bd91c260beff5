use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{JobRegistry, JobRunner, ProgressPublisher, TransferEngine};

/// Shared handles built once by the entry point and passed to every
/// component that needs them.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub registry: JobRegistry,
    pub runner: JobRunner,
    pub engine: TransferEngine,
    pub publisher: ProgressPublisher,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let engine = TransferEngine::new(config.checksum).with_sync_files(config.sync_files);
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: AppConfig, engine: TransferEngine) -> Self {
        let registry = JobRegistry::new();
        let publisher = ProgressPublisher::new(registry.clone(), config.poll_interval());
        Self {
            runner: JobRunner::new(registry.clone()),
            config: Arc::new(config),
            registry,
            engine,
            publisher,
        }
    }
}
