//! Generic event stream publisher.

use std::marker::PhantomData;

use async_nats::jetstream::{self, stream};
use serde::Serialize;

use super::event_stream::EventStream;
use crate::{Error, Result, TRACING_TARGET_STREAM};

/// Publishes typed JSON events to a JetStream stream.
///
/// This publisher is generic over:
/// - `T`: The event type to publish
/// - `S`: The stream configuration (determines stream name, subject, etc.)
#[derive(Debug, Clone)]
pub struct EventPublisher<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: EventStream,
{
    jetstream: jetstream::Context,
    _event: PhantomData<T>,
    _stream: PhantomData<S>,
}

impl<T, S> EventPublisher<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: EventStream,
{
    /// Creates the stream if it does not exist yet.
    #[tracing::instrument(skip(jetstream), target = TRACING_TARGET_STREAM)]
    pub(crate) async fn new(jetstream: &jetstream::Context) -> Result<Self> {
        match jetstream.get_stream(S::NAME).await {
            Ok(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_STREAM,
                    stream = %S::NAME,
                    "Using existing stream"
                );
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_STREAM,
                    stream = %S::NAME,
                    "Creating new stream"
                );
                let config = stream::Config {
                    name: S::NAME.to_string(),
                    description: Some(format!("Events published under {}.>", S::SUBJECT)),
                    subjects: vec![format!("{}.>", S::SUBJECT)],
                    max_age: S::MAX_AGE.unwrap_or_default(),
                    ..Default::default()
                };
                jetstream
                    .create_stream(config)
                    .await
                    .map_err(|e| Error::operation("stream_create", e.to_string()))?;
            }
        }

        Ok(Self {
            jetstream: jetstream.clone(),
            _event: PhantomData,
            _stream: PhantomData,
        })
    }

    /// Subject for `sub_subject` under this stream.
    pub fn subject_for(sub_subject: &str) -> String {
        format!("{}.{}", S::SUBJECT, sub_subject)
    }

    /// Publishes `event` to `{SUBJECT}.{sub_subject}` and waits for the
    /// server acknowledgement.
    #[tracing::instrument(skip(self, event), target = TRACING_TARGET_STREAM)]
    pub async fn publish_to(&self, sub_subject: &str, event: &T) -> Result<()> {
        let subject = Self::subject_for(sub_subject);
        let payload = serde_json::to_vec(event)?;
        let payload_size = payload.len();

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| Error::delivery_failed(&subject, e.to_string()))?
            .await
            .map_err(|e| Error::operation("stream_publish", e.to_string()))?;

        tracing::trace!(
            target: TRACING_TARGET_STREAM,
            subject = %subject,
            payload_size = payload_size,
            "Published event"
        );
        Ok(())
    }

    /// Returns the stream name.
    #[inline]
    pub fn stream_name(&self) -> &'static str {
        S::NAME
    }
}
