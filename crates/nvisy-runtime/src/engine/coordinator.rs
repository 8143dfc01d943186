//! Single writer of task state.
//!
//! Workers never touch a [`Task`]. They report finished attempts over a
//! channel, and the coordinator applies the reprocessing workflow, advances
//! checkpoints, and finalizes tasks, one command at a time. Commands that
//! arrive in a burst are applied together and followed by a single
//! checkpoint per task.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nvisy_core::document::DocumentFormat;
use nvisy_core::event::{EventKind, SharedSink, TaskEvent};
use nvisy_core::provider::ProviderErrorKind;
use nvisy_core::store::{DurableStoreExt, SharedStore};
use nvisy_core::{ChunkId, TaskId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::executor::{AttemptOutput, FinishedAttempt};
use super::queue::{AttemptSpec, WorkQueue};
use crate::error::{RuntimeError, RuntimeResult};
use crate::merge::{self, MergedResult};
use crate::selector::ProviderStatsStore;
use crate::task::{Attempt, AttemptError, Checkpoint, Task, TaskStatus};
use crate::workflow::{AttemptReport, ChunkState, ReprocessingWorkflow, Transition};

/// Tracing target for the coordinator.
const TRACING_TARGET: &str = "nvisy_runtime::engine::coordinator";

type Reply<T> = oneshot::Sender<RuntimeResult<T>>;

/// Requests handled by the coordinator.
pub(crate) enum Command {
    /// Takes ownership of a planned task and starts dispatching it.
    Start {
        task: Box<Task>,
        format: DocumentFormat,
        payloads: Vec<Bytes>,
        resumed: bool,
        reply: Reply<()>,
    },
    Finished(Box<FinishedAttempt>),
    /// A backoff delay elapsed.
    Enqueue {
        task_id: TaskId,
        chunk_id: ChunkId,
        sequence: u32,
    },
    Pause {
        task_id: TaskId,
        reply: Reply<()>,
    },
    Resume {
        task_id: TaskId,
        reply: Reply<()>,
    },
    Cancel {
        task_id: TaskId,
        reply: Reply<()>,
    },
    Status {
        task_id: TaskId,
        reply: oneshot::Sender<Option<Task>>,
    },
    Watch {
        task_id: TaskId,
        reply: oneshot::Sender<Option<watch::Receiver<TaskStatus>>>,
    },
}

struct TaskSlot {
    task: Task,
    format: DocumentFormat,
    /// Chunk payloads by chunk index, dropped once the task is terminal.
    payloads: Vec<Bytes>,
    /// Chunks queued or running.
    pending: BTreeSet<ChunkId>,
    /// Chunks that became terminal since the last checkpoint.
    dirty: Vec<ChunkId>,
    status: watch::Sender<TaskStatus>,
}

pub(crate) struct Coordinator {
    tasks: HashMap<TaskId, TaskSlot>,
    queue: Arc<WorkQueue>,
    store: SharedStore,
    events: SharedSink,
    stats: Arc<ProviderStatsStore>,
    workflow: ReprocessingWorkflow,
    commands: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
    pub fn new(
        workflow: ReprocessingWorkflow,
        queue: Arc<WorkQueue>,
        store: SharedStore,
        events: SharedSink,
        stats: Arc<ProviderStatsStore>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            tasks: HashMap::new(),
            queue,
            store,
            events,
            stats,
            workflow,
            commands,
        }
    }

    /// Processes commands until shutdown.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        tracing::debug!(target: TRACING_TARGET, "coordinator started");
        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            self.handle(command).await;
            while let Ok(command) = commands.try_recv() {
                self.handle(command).await;
            }
            self.flush().await;
        }
        let queued = self.queue.len().await;
        tracing::debug!(
            target: TRACING_TARGET,
            tasks = self.tasks.len(),
            queued,
            "coordinator stopped"
        );
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start {
                task,
                format,
                payloads,
                resumed,
                reply,
            } => {
                let outcome = self.start(*task, format, payloads, resumed).await;
                let _ = reply.send(outcome);
            }
            Command::Finished(finished) => self.finished(*finished).await,
            Command::Enqueue {
                task_id,
                chunk_id,
                sequence,
            } => {
                let due = self.tasks.get(&task_id).and_then(|slot| slot.task.chunk(chunk_id)).is_some_and(
                    |chunk| chunk.state == ChunkState::RetryPending && chunk.next_sequence() == sequence,
                );
                if due {
                    self.dispatch(task_id, chunk_id).await;
                }
            }
            Command::Pause { task_id, reply } => {
                let _ = reply.send(self.pause(task_id).await);
            }
            Command::Resume { task_id, reply } => {
                let _ = reply.send(self.resume(task_id).await);
            }
            Command::Cancel { task_id, reply } => {
                let _ = reply.send(self.cancel(task_id).await);
            }
            Command::Status { task_id, reply } => {
                let _ = reply.send(self.tasks.get(&task_id).map(|slot| slot.task.clone()));
            }
            Command::Watch { task_id, reply } => {
                let _ = reply.send(self.tasks.get(&task_id).map(|slot| slot.status.subscribe()));
            }
        }
    }

    async fn start(
        &mut self,
        mut task: Task,
        format: DocumentFormat,
        payloads: Vec<Bytes>,
        resumed: bool,
    ) -> RuntimeResult<()> {
        let task_id = task.id;
        if !resumed {
            self.events.emit(TaskEvent::new(task_id, EventKind::TaskSubmitted)).await;
            for chunk in &task.chunks {
                self.events
                    .emit(
                        TaskEvent::new(task_id, EventKind::ChunkPlanned)
                            .with_chunk(chunk.id)
                            .with_detail(chunk.pages.to_string()),
                    )
                    .await;
            }
        }
        if task.status == TaskStatus::Pending {
            task.set_status(TaskStatus::Running);
        }
        self.store.put_json(&Task::storage_key(task_id), &task).await?;

        tracing::info!(
            target: TRACING_TARGET,
            task_id = %task_id,
            chunks = task.chunks.len(),
            strategies = task.strategies.len(),
            status = %task.status,
            resumed,
            "task started"
        );
        if task.status == TaskStatus::Running {
            self.events.emit(TaskEvent::new(task_id, EventKind::TaskStarted)).await;
        }

        let chunk_ids: Vec<ChunkId> = task.chunks.iter().map(|chunk| chunk.id).collect();
        let (status, _) = watch::channel(task.status);
        self.tasks.insert(
            task_id,
            TaskSlot {
                task,
                format,
                payloads,
                pending: BTreeSet::new(),
                dirty: Vec::new(),
                status,
            },
        );
        for chunk_id in chunk_ids {
            self.dispatch(task_id, chunk_id).await;
        }
        Ok(())
    }

    /// Queues the next attempt of a chunk if its task is running and the
    /// chunk is neither terminal nor already queued.
    async fn dispatch(&mut self, task_id: TaskId, chunk_id: ChunkId) {
        let Some(slot) = self.tasks.get_mut(&task_id) else {
            return;
        };
        if slot.task.status != TaskStatus::Running || slot.pending.contains(&chunk_id) {
            return;
        }
        let task = &mut slot.task;
        let Some(chunk) = task.chunk(chunk_id) else {
            return;
        };
        if chunk.is_terminal() {
            return;
        }

        let strategy = match &chunk.strategy {
            Some(current) if !task.excluded_providers.contains(&current.provider) => Some(current.clone()),
            Some(current) => self
                .workflow
                .next_strategy(current, &task.strategies, &task.excluded_providers),
            None => self
                .workflow
                .first_strategy(&task.strategies, &task.excluded_providers),
        };

        let content_types = task.content_types.clone();
        let priority = task.priority;
        let Some(chunk) = task.chunk_mut(chunk_id) else {
            return;
        };
        let Some(strategy) = strategy else {
            chunk.state = ChunkState::Exhausted;
            slot.dirty.push(chunk_id);
            self.events
                .emit(
                    TaskEvent::new(task_id, EventKind::ChunkExhausted)
                        .with_chunk(chunk_id)
                        .with_detail("no usable strategy"),
                )
                .await;
            return;
        };

        chunk.strategy = Some(strategy.clone());
        chunk.state = ChunkState::Attempting;
        let spec = AttemptSpec {
            task_id,
            chunk_id,
            sequence: chunk.next_sequence(),
            pages: chunk.pages,
            strategy,
            content_types,
            format: slot.format,
            payload: slot
                .payloads
                .get(chunk_id.index() as usize)
                .cloned()
                .unwrap_or_default(),
        };
        slot.pending.insert(chunk_id);
        self.queue.push(priority, spec).await;
    }

    async fn finished(&mut self, finished: FinishedAttempt) {
        let FinishedAttempt {
            spec,
            started_at,
            finished_at,
            output,
        } = finished;
        let (task_id, chunk_id) = (spec.task_id, spec.chunk_id);

        let Some(slot) = self.tasks.get_mut(&task_id) else {
            return;
        };
        slot.pending.remove(&chunk_id);
        let task = &mut slot.task;
        let current = task
            .chunk(chunk_id)
            .is_some_and(|chunk| chunk.state == ChunkState::Attempting && chunk.next_sequence() == spec.sequence);
        if task.status.is_terminal() || !current {
            tracing::debug!(
                target: TRACING_TARGET,
                task_id = %task_id,
                chunk_id = %chunk_id,
                attempt = spec.sequence,
                "stale attempt discarded"
            );
            return;
        }

        let (report, result, quality, error) = match output {
            AttemptOutput::Scored {
                result,
                quality,
                accepted,
            } => (AttemptReport::Scored { accepted }, Some(result), Some(quality), None),
            AttemptOutput::Failed(error) => {
                if error.excludes_provider() && task.excluded_providers.insert(spec.strategy.provider.clone()) {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        task_id = %task_id,
                        provider = %spec.strategy.provider,
                        "provider excluded for the rest of the task"
                    );
                }
                if matches!(error.kind, ProviderErrorKind::Configuration | ProviderErrorKind::Fatal) {
                    task.diagnostics
                        .push(format!("{}: {error}", spec.strategy.provider));
                }
                let report = AttemptReport::Failed {
                    kind: error.kind,
                    retry_after: error.retry_after,
                };
                (report, None, None, Some(AttemptError::from(&error)))
            }
        };

        let transition = match task.chunk(chunk_id) {
            Some(chunk) => self
                .workflow
                .decide(chunk, report, &task.strategies, &task.excluded_providers),
            None => return,
        };
        task.touch();
        let Some(chunk) = task.chunk_mut(chunk_id) else {
            return;
        };
        chunk.attempts.push(Attempt {
            sequence: spec.sequence,
            strategy: spec.strategy,
            started_at,
            finished_at,
            result,
            quality: quality.clone(),
            error,
            outcome: transition.outcome(),
        });
        chunk.state = transition.state();

        let mut event = TaskEvent::new(task_id, EventKind::ChunkRetryPending)
            .with_chunk(chunk_id)
            .with_attempt(spec.sequence);
        if let Some(quality) = quality {
            event = event.with_quality(quality);
        }

        match transition {
            Transition::Accept => {
                slot.dirty.push(chunk_id);
                event.kind = EventKind::ChunkAccepted;
                self.events.emit(event).await;
            }
            Transition::Exhaust => {
                slot.dirty.push(chunk_id);
                event.kind = EventKind::ChunkExhausted;
                self.events.emit(event).await;
            }
            Transition::RetryPending { strategy, delay } => {
                chunk.strategy = Some(strategy);
                let sequence = chunk.next_sequence();
                self.events.emit(event).await;
                self.schedule(task_id, chunk_id, sequence, delay).await;
            }
        }
    }

    async fn schedule(&mut self, task_id: TaskId, chunk_id: ChunkId, sequence: u32, delay: Duration) {
        if delay.is_zero() {
            self.dispatch(task_id, chunk_id).await;
            return;
        }
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Enqueue {
                task_id,
                chunk_id,
                sequence,
            });
        });
    }

    async fn pause(&mut self, task_id: TaskId) -> RuntimeResult<()> {
        let slot = self.tasks.get_mut(&task_id).ok_or(RuntimeError::TaskNotFound(task_id))?;
        if slot.task.status != TaskStatus::Running {
            return Err(RuntimeError::InvalidState {
                task_id,
                status: slot.task.status,
                operation: "pause",
            });
        }
        for chunk_id in self.queue.remove_task(task_id).await {
            slot.pending.remove(&chunk_id);
        }
        slot.task.set_status(TaskStatus::Paused);
        slot.status.send_replace(TaskStatus::Paused);
        self.store.put_json(&Task::storage_key(task_id), &slot.task).await?;
        self.events.emit(TaskEvent::new(task_id, EventKind::TaskPaused)).await;
        tracing::info!(target: TRACING_TARGET, task_id = %task_id, in_flight = slot.pending.len(), "task paused");
        Ok(())
    }

    async fn resume(&mut self, task_id: TaskId) -> RuntimeResult<()> {
        let slot = self.tasks.get_mut(&task_id).ok_or(RuntimeError::TaskNotFound(task_id))?;
        if slot.task.status != TaskStatus::Paused {
            return Err(RuntimeError::InvalidState {
                task_id,
                status: slot.task.status,
                operation: "resume",
            });
        }
        slot.task.set_status(TaskStatus::Running);
        slot.status.send_replace(TaskStatus::Running);
        self.store.put_json(&Task::storage_key(task_id), &slot.task).await?;
        let chunk_ids: Vec<ChunkId> = slot.task.chunks.iter().map(|chunk| chunk.id).collect();
        self.events.emit(TaskEvent::new(task_id, EventKind::TaskResumed)).await;
        tracing::info!(target: TRACING_TARGET, task_id = %task_id, "task resumed");

        for chunk_id in chunk_ids {
            self.dispatch(task_id, chunk_id).await;
        }
        Ok(())
    }

    async fn cancel(&mut self, task_id: TaskId) -> RuntimeResult<()> {
        let slot = self.tasks.get_mut(&task_id).ok_or(RuntimeError::TaskNotFound(task_id))?;
        if slot.task.status.is_terminal() {
            return Err(RuntimeError::InvalidState {
                task_id,
                status: slot.task.status,
                operation: "cancel",
            });
        }
        self.queue.remove_task(task_id).await;
        let in_flight = slot.pending.len();
        slot.pending.clear();
        slot.dirty.clear();
        for chunk in slot.task.chunks.iter_mut().filter(|chunk| !chunk.is_terminal()) {
            chunk.state = ChunkState::Cancelled;
        }
        slot.task.set_status(TaskStatus::Cancelled);
        slot.payloads = Vec::new();
        slot.status.send_replace(TaskStatus::Cancelled);
        self.store.put_json(&Task::storage_key(task_id), &slot.task).await?;
        self.events.emit(TaskEvent::new(task_id, EventKind::TaskCancelled)).await;
        tracing::info!(target: TRACING_TARGET, task_id = %task_id, in_flight, "task cancelled");
        Ok(())
    }

    /// Writes one checkpoint per task with newly terminal chunks and
    /// finalizes tasks that are done.
    async fn flush(&mut self) {
        let ready: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, slot)| {
                !slot.dirty.is_empty()
                    || (slot.task.status == TaskStatus::Running && slot.task.all_chunks_terminal())
            })
            .map(|(&task_id, _)| task_id)
            .collect();

        for task_id in ready {
            self.checkpoint(task_id).await;
            self.finalize(task_id).await;
        }
    }

    async fn checkpoint(&mut self, task_id: TaskId) {
        let Some(slot) = self.tasks.get_mut(&task_id) else {
            return;
        };
        let dirty = std::mem::take(&mut slot.dirty);
        let Some(checkpoint) = Checkpoint::capture(&slot.task, &dirty) else {
            return;
        };

        match self.store.put_json(&checkpoint.key(), &checkpoint).await {
            Ok(()) => {
                slot.task.checkpoint = Some(checkpoint.sequence);
                tracing::debug!(
                    target: TRACING_TARGET,
                    task_id = %task_id,
                    sequence = checkpoint.sequence,
                    completed = checkpoint.completed.len(),
                    "checkpoint written"
                );
                self.events
                    .emit(
                        TaskEvent::new(task_id, EventKind::CheckpointWritten)
                            .with_chunk(checkpoint.last_completed)
                            .with_detail(checkpoint.sequence.to_string()),
                    )
                    .await;
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    task_id = %task_id,
                    error = %err,
                    "failed to write checkpoint, retrying with the next one"
                );
                slot.dirty = dirty;
            }
        }
    }

    async fn finalize(&mut self, task_id: TaskId) {
        let Some(slot) = self.tasks.get_mut(&task_id) else {
            return;
        };
        let task = &mut slot.task;
        if task.status != TaskStatus::Running || !task.all_chunks_terminal() {
            return;
        }

        let no_output = task
            .chunks
            .iter()
            .all(|chunk| chunk.state == ChunkState::Exhausted && chunk.has_no_output());
        let mut quality = None;
        let status = if no_output {
            task.diagnostics.push("no attempt produced usable output".into());
            TaskStatus::Failed
        } else {
            let merged = merge::merge(task);
            match self.store.put_json(&MergedResult::storage_key(task_id), &merged).await {
                Ok(()) => {
                    quality = Some(merged.quality);
                    TaskStatus::Completed
                }
                Err(err) => {
                    tracing::error!(target: TRACING_TARGET, task_id = %task_id, error = %err, "failed to store result");
                    task.diagnostics.push(format!("failed to store result: {err}"));
                    TaskStatus::Failed
                }
            }
        };
        task.set_status(status);

        self.stats.record(task).await;
        if let Err(err) = self.stats.persist(self.store.as_ref()).await {
            tracing::warn!(target: TRACING_TARGET, error = %err, "failed to persist provider statistics");
        }
        if let Err(err) = self.store.put_json(&Task::storage_key(task_id), &*task).await {
            tracing::error!(target: TRACING_TARGET, task_id = %task_id, error = %err, "failed to store task record");
        }

        let kind = match status {
            TaskStatus::Completed => EventKind::TaskCompleted,
            _ => EventKind::TaskFailed,
        };
        let mut event = TaskEvent::new(task_id, kind);
        if let Some(quality) = quality {
            event = event.with_quality(quality);
        }
        tracing::info!(
            target: TRACING_TARGET,
            task_id = %task_id,
            status = %status,
            low_confidence = task.is_low_confidence(),
            "task finished"
        );
        slot.payloads = Vec::new();
        slot.status.send_replace(status);
        self.events.emit(event).await;
    }
}
