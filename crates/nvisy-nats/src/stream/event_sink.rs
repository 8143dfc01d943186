//! Task event sink publishing to JetStream.

use async_nats::jetstream;
use derive_more::Deref;
use nvisy_core::event::{EventSink, TaskEvent};

use super::event_pub::EventPublisher;
use super::event_stream::TaskEventStream;
use crate::{Result, TRACING_TARGET_STREAM};

/// [`EventSink`] publishing every event to `ocr.events.<task-id>`.
///
/// Publishing failures are logged and dropped; the event stream is
/// informational and never stalls the pipeline.
#[derive(Debug, Clone, Deref)]
pub struct NatsEventSink {
    publisher: EventPublisher<TaskEvent, TaskEventStream>,
}

impl NatsEventSink {
    pub(crate) async fn new(jetstream: &jetstream::Context) -> Result<Self> {
        Ok(Self {
            publisher: EventPublisher::new(jetstream).await?,
        })
    }
}

#[async_trait::async_trait]
impl EventSink for NatsEventSink {
    async fn emit(&self, event: TaskEvent) {
        let sub_subject = event.task_id.to_string();
        if let Err(err) = self.publisher.publish_to(&sub_subject, &event).await {
            tracing::warn!(
                target: TRACING_TARGET_STREAM,
                task_id = %event.task_id,
                kind = %event.kind,
                error = %err,
                "Failed to publish task event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::TaskId;

    use super::*;

    #[test]
    fn events_are_published_per_task() {
        let task_id = TaskId::new();
        assert_eq!(
            EventPublisher::<TaskEvent, TaskEventStream>::subject_for(&task_id.to_string()),
            format!("ocr.events.{task_id}")
        );
    }
}
