//! Task manager: the public face of the engine.

use std::sync::Arc;

use bytes::Bytes;
use nvisy_core::document::{Document, DocumentFormat, DocumentId, PageRange};
use nvisy_core::event::{EventKind, SharedSink, TaskEvent};
use nvisy_core::provider::ProviderId;
use nvisy_core::store::{DurableStoreExt, SharedStore};
use nvisy_core::{ServiceHealth, TaskId};
use nvisy_provider::ProviderRegistry;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::EngineConfig;
use super::coordinator::{Command, Coordinator};
use super::executor::AttemptExecutor;
use super::queue::WorkQueue;
use crate::error::{RuntimeError, RuntimeResult};
use crate::inspect;
use crate::merge::MergedResult;
use crate::planner::ChunkPlanner;
use crate::selector::{ProviderStatsStore, StrategySelector};
use crate::task::{Checkpoint, SubmitRequest, Task, TaskStatus};
use crate::workflow::ReprocessingWorkflow;

/// Tracing target for the task manager.
const TRACING_TARGET: &str = "nvisy_runtime::engine::manager";

/// An inspected document with its chunk payloads.
type Prepared = (Document, DocumentFormat, Vec<Bytes>);

/// Owns the worker pool and the task lifecycle.
///
/// Cloning is cheap; all clones drive the same engine.
///
/// ```rust,ignore
/// let manager = TaskManager::start(config, registry, store, events).await?;
/// let task_id = manager.submit(bytes, SubmitRequest::new(ContentTypes::text())).await?;
/// let task = manager.wait(task_id).await?;
/// let result = manager.result(task_id).await?;
/// manager.shutdown().await;
/// ```
#[derive(Clone)]
pub struct TaskManager {
    registry: Arc<ProviderRegistry>,
    store: SharedStore,
    events: SharedSink,
    stats: Arc<ProviderStatsStore>,
    selector: StrategySelector,
    planner: ChunkPlanner,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskManager {
    /// Loads provider statistics and spawns the workers and the coordinator.
    pub async fn start(
        config: EngineConfig,
        registry: ProviderRegistry,
        store: SharedStore,
        events: SharedSink,
    ) -> RuntimeResult<Self> {
        if registry.is_empty() {
            return Err(RuntimeError::NoProvider("no providers registered".into()));
        }
        tokio::fs::create_dir_all(&config.work_root).await.map_err(|err| {
            RuntimeError::Config(format!(
                "cannot create work root {}: {err}",
                config.work_root.display()
            ))
        })?;

        let registry = Arc::new(registry);
        let stats = Arc::new(ProviderStatsStore::load(store.as_ref(), config.ema_alpha).await?);
        let queue = Arc::new(WorkQueue::new());
        let shutdown = CancellationToken::new();
        let (commands, receiver) = mpsc::unbounded_channel();

        let executor = Arc::new(AttemptExecutor::new(&config, registry.clone(), events.clone()));
        let mut handles = Vec::with_capacity(config.concurrency + 1);
        for worker in 0..config.concurrency {
            handles.push(tokio::spawn(run_worker(
                worker,
                queue.clone(),
                executor.clone(),
                commands.clone(),
                shutdown.clone(),
            )));
        }

        let coordinator = Coordinator::new(
            ReprocessingWorkflow::new(&config),
            queue,
            store.clone(),
            events.clone(),
            stats.clone(),
            commands.clone(),
        );
        handles.push(tokio::spawn(coordinator.run(receiver, shutdown.clone())));

        tracing::info!(
            target: TRACING_TARGET,
            workers = config.concurrency,
            cloud_concurrency = config.cloud_concurrency,
            providers = registry.len(),
            chunk_pages = config.chunk_pages,
            max_attempts = config.max_attempts,
            "task manager started"
        );

        Ok(Self {
            registry,
            store,
            events,
            stats,
            selector: StrategySelector::new(&config),
            planner: ChunkPlanner::new(config.chunk_pages),
            commands,
            shutdown,
            handles: Arc::new(Mutex::new(handles)),
        })
    }

    /// Stores `bytes` and submits them for recognition.
    ///
    /// Unreadable input still yields a task id; the task is `Failed` with
    /// the reason in its diagnostics.
    pub async fn submit(&self, bytes: Bytes, request: SubmitRequest) -> RuntimeResult<TaskId> {
        validate(&request)?;
        let document_id = DocumentId::from_bytes(&bytes);
        self.store.put(&document_id.storage_key(), bytes.clone()).await?;
        self.ingest(document_id, bytes, request).await
    }

    /// Submits a document whose bytes are already in the store.
    pub async fn submit_document(&self, document_id: DocumentId, request: SubmitRequest) -> RuntimeResult<TaskId> {
        validate(&request)?;
        let bytes = self
            .store
            .get(&document_id.storage_key())
            .await?
            .ok_or_else(|| RuntimeError::DocumentNotFound(document_id.clone()))?;
        self.ingest(document_id, bytes, request).await
    }

    async fn ingest(&self, document_id: DocumentId, bytes: Bytes, request: SubmitRequest) -> RuntimeResult<TaskId> {
        let task_id = TaskId::new();
        let mut task = Task::new(task_id, document_id, &request);

        match self.prepare(bytes, request.languages.clone(), None).await? {
            Ok((document, format, payloads)) => {
                let stats = self.stats.snapshot().await;
                let selection = self
                    .selector
                    .select(&document.profile(), &task.content_types, self.registry.descriptors(), &stats)
                    .ok_or_else(|| {
                        RuntimeError::NoProvider(format!("no provider accepts {} documents", document.kind))
                    })?;
                task.chunks = self.planner.plan(task_id, &document);
                task.strategies = selection.strategies;
                task.low_confidence_expected = selection.low_confidence_expected;
                task.document = Some(document);
                self.send(|reply| Command::Start {
                    task: Box::new(task),
                    format,
                    payloads,
                    resumed: false,
                    reply,
                })
                .await?;
            }
            Err(reason) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    task_id = %task_id,
                    document_id = %task.document_id,
                    reason = %reason,
                    "document rejected"
                );
                task.set_status(TaskStatus::Failed);
                task.diagnostics.push(reason.to_string());
                self.store.put_json(&Task::storage_key(task_id), &task).await?;
                self.events.emit(TaskEvent::new(task_id, EventKind::TaskSubmitted)).await;
                self.events
                    .emit(TaskEvent::new(task_id, EventKind::TaskFailed).with_detail(reason.to_string()))
                    .await;
            }
        }
        Ok(task_id)
    }

    /// Inspects and slices on a blocking thread. The inner error is an input
    /// problem that fails the task; the outer one aborts the submission.
    ///
    /// Recovered tasks pass their stored chunk ranges so payloads line up
    /// with the chunks, whatever the current chunk size.
    async fn prepare(
        &self,
        bytes: Bytes,
        languages: Vec<String>,
        ranges: Option<Vec<PageRange>>,
    ) -> RuntimeResult<Result<Prepared, RuntimeError>> {
        let planner = self.planner;
        let prepared = tokio::task::spawn_blocking(move || {
            let document = inspect::inspect(&bytes, languages)?;
            let ranges = ranges.unwrap_or_else(|| planner.ranges(document.page_count));
            let payloads = inspect::slice(&bytes, document.format, &ranges)?;
            let format = document.format;
            Ok::<_, RuntimeError>((document, format, payloads))
        })
        .await
        .map_err(|err| RuntimeError::Internal(format!("inspection panicked: {err}")))?;

        match prepared {
            Err(err) if !err.is_input_error() => Err(err),
            other => Ok(other),
        }
    }

    /// Stops dispatching new attempts of a running task. In-flight attempts
    /// finish and are recorded.
    pub async fn pause(&self, task_id: TaskId) -> RuntimeResult<()> {
        self.send(|reply| Command::Pause { task_id, reply }).await
    }

    /// Resumes a paused task.
    pub async fn resume(&self, task_id: TaskId) -> RuntimeResult<()> {
        self.send(|reply| Command::Resume { task_id, reply }).await
    }

    /// Cancels a task. Results of in-flight attempts are discarded when they
    /// arrive.
    pub async fn cancel(&self, task_id: TaskId) -> RuntimeResult<()> {
        self.send(|reply| Command::Cancel { task_id, reply }).await
    }

    /// Returns the current state of a task, active or stored.
    pub async fn get_status(&self, task_id: TaskId) -> RuntimeResult<Task> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Status { task_id, reply }).is_ok()
            && let Ok(Some(task)) = response.await
        {
            return Ok(task);
        }
        self.store
            .get_json::<Task>(&Task::storage_key(task_id))
            .await?
            .ok_or(RuntimeError::TaskNotFound(task_id))
    }

    /// Waits until a task reaches a terminal status and returns it.
    pub async fn wait(&self, task_id: TaskId) -> RuntimeResult<Task> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Watch { task_id, reply })
            .map_err(|_| RuntimeError::ShutDown)?;
        if let Some(mut status) = response.await.map_err(|_| RuntimeError::ShutDown)? {
            status
                .wait_for(|status| status.is_terminal())
                .await
                .map_err(|_| RuntimeError::ShutDown)?;
        }
        self.get_status(task_id).await
    }

    /// Loads the merged result of a completed task.
    pub async fn result(&self, task_id: TaskId) -> RuntimeResult<Option<MergedResult>> {
        Ok(self.store.get_json(&MergedResult::storage_key(task_id)).await?)
    }

    /// Reloads every non-terminal task from the store and continues it.
    ///
    /// Terminal chunks are restored from checkpoints and never run again.
    /// The remaining chunks start over. Paused tasks stay paused.
    pub async fn recover(&self) -> RuntimeResult<Vec<TaskId>> {
        let mut recovered = Vec::new();
        for key in self.store.keys(Task::STORAGE_PREFIX).await? {
            let Some(mut task) = self.store.get_json::<Task>(&key).await? else {
                continue;
            };
            if task.status.is_terminal() {
                continue;
            }

            for key in self.store.keys(&Checkpoint::prefix(task.id)).await? {
                if let Some(checkpoint) = self.store.get_json::<Checkpoint>(&key).await? {
                    checkpoint.apply(&mut task);
                }
            }
            for chunk in task.chunks.iter_mut().filter(|chunk| !chunk.is_terminal()) {
                chunk.restart();
            }

            let task_id = task.id;
            let Some(bytes) = self.store.get(&task.document_id.storage_key()).await? else {
                tracing::error!(
                    target: TRACING_TARGET,
                    task_id = %task_id,
                    document_id = %task.document_id,
                    "source document missing, task failed"
                );
                task.set_status(TaskStatus::Failed);
                task.diagnostics.push("source document missing on recovery".into());
                self.store.put_json(&key, &task).await?;
                continue;
            };

            let languages = task.document.as_ref().map(|d| d.languages.clone()).unwrap_or_default();
            let ranges = task.chunks.iter().map(|chunk| chunk.pages).collect();
            let (format, payloads) = match self.prepare(bytes, languages, Some(ranges)).await? {
                Ok((_, format, payloads)) => (format, payloads),
                Err(reason) => {
                    task.set_status(TaskStatus::Failed);
                    task.diagnostics.push(reason.to_string());
                    self.store.put_json(&key, &task).await?;
                    continue;
                }
            };

            tracing::info!(
                target: TRACING_TARGET,
                task_id = %task_id,
                checkpoint = task.checkpoint,
                remaining = task.chunks.iter().filter(|chunk| !chunk.is_terminal()).count(),
                "task recovered"
            );
            self.send(|reply| Command::Start {
                task: Box::new(task),
                format,
                payloads,
                resumed: true,
                reply,
            })
            .await?;
            recovered.push(task_id);
        }
        Ok(recovered)
    }

    /// Health of every registered provider.
    pub async fn health(&self) -> Vec<(ProviderId, ServiceHealth)> {
        self.registry.health().await
    }

    /// Stops the workers and the coordinator. Attempts in flight are
    /// abandoned; their tasks resume from the last checkpoint on the next
    /// [`recover`](Self::recover).
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(target: TRACING_TARGET, error = %err, "engine task ended abnormally");
            }
        }
        tracing::info!(target: TRACING_TARGET, "task manager stopped");
    }

    async fn send<T>(&self, command: impl FnOnce(oneshot::Sender<RuntimeResult<T>>) -> Command) -> RuntimeResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| RuntimeError::ShutDown)?;
        response.await.map_err(|_| RuntimeError::ShutDown)?
    }
}

fn validate(request: &SubmitRequest) -> RuntimeResult<()> {
    if request.content_types.is_empty() {
        return Err(RuntimeError::InvalidRequest("no content types requested".into()));
    }
    Ok(())
}

async fn run_worker(
    worker: usize,
    queue: Arc<WorkQueue>,
    executor: Arc<AttemptExecutor>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
) {
    tracing::trace!(target: TRACING_TARGET, worker, "worker started");
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = queue.pop() => item,
        };
        let finished = tokio::select! {
            _ = shutdown.cancelled() => break,
            finished = executor.run(item.attempt) => finished,
        };
        if commands.send(Command::Finished(Box::new(finished))).is_err() {
            break;
        }
    }
    tracing::trace!(target: TRACING_TARGET, worker, "worker stopped");
}
