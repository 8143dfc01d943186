//! Progress reporting on the terminal.

use nvisy_core::event::{EventKind, EventSink, SharedSink, TaskEvent};

use crate::TRACING_TARGET_PROGRESS;

/// Logs task events and forwards them to the configured sink.
///
/// Task transitions and chunk outcomes are logged at `info`, attempt
/// bookkeeping at `debug`.
pub struct ProgressSink {
    inner: SharedSink,
}

impl ProgressSink {
    pub fn new(inner: SharedSink) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl EventSink for ProgressSink {
    async fn emit(&self, event: TaskEvent) {
        let overall = event.quality.as_ref().map(|quality| quality.overall);
        let chunk = event.chunk.map(|chunk| chunk.index());
        let provider = event.provider.as_ref().map(ToString::to_string);

        match event.kind {
            EventKind::AttemptStarted | EventKind::AttemptFinished | EventKind::CheckpointWritten => {
                tracing::debug!(
                    target: TRACING_TARGET_PROGRESS,
                    task_id = %event.task_id,
                    event = %event.kind,
                    chunk = ?chunk,
                    attempt = ?event.attempt,
                    provider = ?provider,
                    quality = ?overall,
                    detail = ?event.detail,
                    "task event"
                )
            }
            _ => {
                tracing::info!(
                    target: TRACING_TARGET_PROGRESS,
                    task_id = %event.task_id,
                    event = %event.kind,
                    chunk = ?chunk,
                    provider = ?provider,
                    quality = ?overall,
                    detail = ?event.detail,
                    "task event"
                )
            }
        }

        self.inner.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nvisy_core::event::BroadcastSink;
    use nvisy_core::{ChunkId, TaskId};

    use super::*;

    #[tokio::test]
    async fn forwards_every_event() {
        let broadcast = Arc::new(BroadcastSink::new(8));
        let mut events = broadcast.subscribe();
        let sink = ProgressSink::new(broadcast);

        let task_id = TaskId::new();
        sink.emit(TaskEvent::new(task_id, EventKind::TaskStarted)).await;
        sink.emit(TaskEvent::new(task_id, EventKind::AttemptStarted).with_chunk(ChunkId::new(0)))
            .await;

        assert_eq!(events.recv().await.unwrap().kind, EventKind::TaskStarted);
        let attempt = events.recv().await.unwrap();
        assert_eq!(attempt.kind, EventKind::AttemptStarted);
        assert_eq!(attempt.chunk, Some(ChunkId::new(0)));
    }
}
