//! Service container for dependency injection.
//!
//! Builds the store, preview engine, handler registry and task queue from an
//! [`AppConfig`] and owns their lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::tasks::{RecoveryReport, TaskService};
use crate::Result;
use crate::config::AppConfig;
use crate::pipeline::{HandlerRegistry, TaskQueue, TaskQueueConfig, register_default_handlers};
use crate::preview::{FfmpegTool, MediaTool, PreviewEngine};
use crate::storage::Store;

/// Service container holding all application services.
pub struct ServiceContainer {
    pub config: AppConfig,
    pub store: Store,
    pub engine: Arc<PreviewEngine>,
    pub registry: Arc<HandlerRegistry>,
    pub queue: Arc<TaskQueue>,
    pub tasks: TaskService,
    /// Cancelled on shutdown; background jobs should watch it.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Open the configured store and wire the services using ffmpeg.
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config).await?;
        let tool = Arc::new(FfmpegTool::from_config(&config.media));
        Ok(Self::with_store(config, store, tool))
    }

    /// Wire the services over an already opened store.
    pub fn with_store(config: AppConfig, store: Store, tool: Arc<dyn MediaTool>) -> Self {
        info!("Initializing service container");

        let engine = Arc::new(PreviewEngine::new(
            store.catalog.clone(),
            tool,
            config.media.clone(),
        ));

        let registry = Arc::new(HandlerRegistry::new());
        register_default_handlers(&registry, engine.clone());

        let queue = Arc::new(TaskQueue::new(
            TaskQueueConfig {
                buffer_size: config.task_buffer_size,
                max_concurrent_tasks: config.max_concurrent_tasks,
                redact_root: Some(config.content_dir.clone()),
            },
            store.tasks.clone(),
            registry.clone(),
        ));

        let tasks = TaskService::new(store.tasks.clone(), store.catalog.clone(), queue.clone());

        Self {
            config,
            store,
            engine,
            registry,
            queue,
            tasks,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the workers and pick up tasks left by a previous run.
    pub async fn start(&self) -> Result<RecoveryReport> {
        self.queue.start();
        let report = self.tasks.recover().await?;
        info!(
            interrupted = report.interrupted,
            requeued = report.requeued,
            "Services started"
        );
        Ok(report)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop accepting tasks and wait for buffered ones to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.queue.shutdown().await;
        info!("Services shut down");
    }
}
