//! Prelude module for nvisy-nats.
//!
//! ```rust,ignore
//! use nvisy_nats::prelude::*;
//!
//! let client = NatsClient::connect(NatsConfig::new("nats://localhost:4222")).await?;
//! let store = client.durable_store().await?;
//! ```

pub use crate::client::{NatsClient, NatsConfig};
pub use crate::stream::{EventPublisher, EventStream, NatsEventSink, TaskEventStream};
pub use crate::{Error, NatsStore, Result};
