//! Subcommand implementations.

mod process;
mod progress;
mod resume;
mod status;

use std::sync::Arc;

use anyhow::Context;
use nvisy_core::TaskId;
use nvisy_core::event::{NoopSink, SharedSink};
use nvisy_core::store::{FsStore, SharedStore};
use nvisy_nats::NatsClient;
use nvisy_provider::ProviderRegistry;
use nvisy_runtime::engine::TaskManager;
use nvisy_runtime::task::{Task, TaskStatus};
use nvisy_runtime::workflow::ChunkState;

pub use self::process::process;
use self::progress::ProgressSink;
pub use self::resume::resume;
pub use self::status::status;
use crate::config::{Cli, StoreBackend};
use crate::{TRACING_TARGET_PROGRESS, TRACING_TARGET_SHUTDOWN, TRACING_TARGET_STARTUP};

/// The store and event sink selected by the configuration.
struct Backend {
    store: SharedStore,
    events: SharedSink,
}

impl Backend {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        match cli.store.backend {
            StoreBackend::Fs => {
                let store = FsStore::open(&cli.store.store_dir)
                    .await
                    .with_context(|| {
                        format!("failed to open store at {}", cli.store.store_dir.display())
                    })?;
                Ok(Self {
                    store: Arc::new(store),
                    events: Arc::new(NoopSink),
                })
            }
            StoreBackend::Nats => {
                let client = NatsClient::connect(cli.store.nats.clone())
                    .await
                    .context("failed to connect to NATS")?;
                let store = client
                    .durable_store()
                    .await
                    .context("failed to open NATS buckets")?;
                let events = client
                    .event_sink()
                    .await
                    .context("failed to open the task event stream")?;
                Ok(Self {
                    store: Arc::new(store),
                    events: Arc::new(events),
                })
            }
        }
    }
}

/// Builds the registry, opens the store and starts the task manager.
async fn start_manager(cli: &Cli) -> anyhow::Result<TaskManager> {
    let config = cli.engine.build().await?;
    let registry =
        ProviderRegistry::from_config(&cli.providers).context("failed to register providers")?;
    let providers: Vec<String> = registry.ids().map(ToString::to_string).collect();
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        providers = ?providers,
        workers = config.concurrency,
        "Starting task manager"
    );

    let backend = Backend::open(cli).await?;
    let events: SharedSink = Arc::new(ProgressSink::new(backend.events));
    TaskManager::start(config, registry, backend.store, events)
        .await
        .context("failed to start the task manager")
}

/// Waits for a task, or stops the manager on a shutdown signal.
///
/// Returns `None` when interrupted; the task stays checkpointed.
async fn wait_or_interrupt(manager: &TaskManager, task_id: TaskId) -> anyhow::Result<Option<Task>> {
    tokio::select! {
        finished = manager.wait(task_id) => {
            finished.with_context(|| format!("failed to wait for task {task_id}")).map(Some)
        }
        () = crate::signal::shutdown_signal() => {
            manager.shutdown().await;
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                task_id = %task_id,
                "Interrupted, run `nvisy resume` to continue"
            );
            Ok(None)
        }
    }
}

/// Logs the outcome of a finished task.
fn log_summary(task: &Task) {
    let accepted = task
        .chunks
        .iter()
        .filter(|chunk| chunk.state == ChunkState::Accepted)
        .count();
    let attempts: usize = task.chunks.iter().map(|chunk| chunk.attempts.len()).sum();

    match task.status {
        TaskStatus::Completed => tracing::info!(
            target: TRACING_TARGET_PROGRESS,
            task_id = %task.id,
            chunks = task.chunks.len(),
            accepted,
            attempts,
            low_confidence = task.is_low_confidence(),
            "Task completed"
        ),
        status => tracing::warn!(
            target: TRACING_TARGET_PROGRESS,
            task_id = %task.id,
            status = %status,
            diagnostics = ?task.diagnostics,
            "Task did not complete"
        ),
    }
}
