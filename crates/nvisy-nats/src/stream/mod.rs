//! JetStream streams for task lifecycle events.

mod event_pub;
mod event_sink;
mod event_stream;

pub use event_pub::EventPublisher;
pub use event_sink::NatsEventSink;
pub use event_stream::{EventStream, TaskEventStream};
