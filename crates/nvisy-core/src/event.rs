//! Task lifecycle events.
//!
//! The runtime reports every task and chunk transition to an [`EventSink`].
//! Sinks never fail the pipeline: delivery problems are logged by the sink
//! and otherwise ignored.

use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};
use tokio::sync::broadcast;

use crate::id::{ChunkId, TaskId};
use crate::provider::ProviderId;
use crate::quality::QualityScore;

/// Tracing target for event delivery.
pub const TRACING_TARGET: &str = "nvisy_core::event";

/// Which transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskSubmitted,
    TaskStarted,
    TaskPaused,
    TaskResumed,
    TaskCancelled,
    TaskCompleted,
    TaskFailed,
    ChunkPlanned,
    AttemptStarted,
    AttemptFinished,
    ChunkAccepted,
    ChunkRetryPending,
    ChunkExhausted,
    CheckpointWritten,
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskEvent {
    /// Creates a task-level event stamped with the current time.
    pub fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self {
            task_id,
            kind,
            timestamp: Timestamp::now(),
            chunk: None,
            attempt: None,
            provider: None,
            quality: None,
            detail: None,
        }
    }

    pub fn with_chunk(mut self, chunk: ChunkId) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_quality(mut self, quality: QualityScore) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Type alias for a shared event sink.
pub type SharedSink = Arc<dyn EventSink>;

/// Receiver of task lifecycle events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: TaskEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait::async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: TaskEvent) {}
}

/// In-process fan-out over a [`tokio::sync::broadcast`] channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<TaskEvent>,
}

impl BroadcastSink {
    /// Creates a sink buffering up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait::async_trait]
impl EventSink for BroadcastSink {
    async fn emit(&self, event: TaskEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!(target: TRACING_TARGET, "no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut receiver = sink.subscribe();
        let task_id = TaskId::new();

        sink.emit(TaskEvent::new(task_id, EventKind::TaskSubmitted)).await;
        sink.emit(
            TaskEvent::new(task_id, EventKind::ChunkAccepted)
                .with_chunk(ChunkId::new(2))
                .with_attempt(1),
        )
        .await;

        assert_eq!(receiver.recv().await.unwrap().kind, EventKind::TaskSubmitted);
        let accepted = receiver.recv().await.unwrap();
        assert_eq!(accepted.chunk, Some(ChunkId::new(2)));
        assert_eq!(accepted.attempt, Some(1));
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        BroadcastSink::default()
            .emit(TaskEvent::new(TaskId::new(), EventKind::TaskFailed))
            .await;
    }
}
