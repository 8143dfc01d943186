//! Event stream configuration for NATS JetStream.

use std::time::Duration;

/// Marker trait for event streams.
///
/// This trait defines the configuration for a NATS JetStream stream.
pub trait EventStream: Clone + Send + Sync + 'static {
    /// Stream name used in NATS JetStream.
    const NAME: &'static str;

    /// Subject prefix; the stream captures `{SUBJECT}.>`.
    const SUBJECT: &'static str;

    /// Maximum age for messages in this stream.
    /// Returns `None` for streams where messages should not expire.
    const MAX_AGE: Option<Duration>;
}

/// Stream of task lifecycle events, one subject per task.
///
/// Messages expire after 7 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskEventStream;

impl EventStream for TaskEventStream {
    const MAX_AGE: Option<Duration> = Some(Duration::from_secs(7 * 24 * 60 * 60));
    const NAME: &'static str = "OCR_EVENTS";
    const SUBJECT: &'static str = "ocr.events";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_event_stream() {
        assert_eq!(TaskEventStream::NAME, "OCR_EVENTS");
        assert_eq!(TaskEventStream::SUBJECT, "ocr.events");
        assert_eq!(
            TaskEventStream::MAX_AGE,
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );
    }
}
