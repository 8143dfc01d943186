//! Provider error taxonomy.
//!
//! Every adapter failure is classified into one of four kinds. The
//! reprocessing workflow decides what to do next purely from the kind:
//!
//! - [`ProviderErrorKind::Transient`]: retry with backoff, same or next strategy.
//! - [`ProviderErrorKind::Configuration`]: never retry this strategy.
//! - [`ProviderErrorKind::UnsupportedInput`]: escalate to the next strategy, no backoff.
//! - [`ProviderErrorKind::Fatal`]: exclude the provider for the rest of the task.
//!
//! Deadline expiry is reported as a transient error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::BoxedError;

/// Result type alias for provider operations.
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Network blip, rate limit, overload or deadline expiry.
    Transient,
    /// Bad parameters or credentials.
    Configuration,
    /// The provider cannot handle this content.
    UnsupportedInput,
    /// The provider crashed unrecoverably.
    Fatal,
}

/// Error returned by a [`ProviderAdapter`](super::ProviderAdapter).
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// The classification of the failure.
    pub kind: ProviderErrorKind,
    /// Human readable description.
    pub message: String,
    /// Delay suggested by the provider before retrying, e.g. `Retry-After`.
    pub retry_after: Option<Duration>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl ProviderError {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message)
    }

    pub fn unsupported_input(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::UnsupportedInput, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Fatal, message)
    }

    /// Creates the error reported when an attempt outlives its deadline.
    pub fn deadline_exceeded(allowed: Duration) -> Self {
        Self::transient(format!("deadline of {}ms exceeded", allowed.as_millis()))
    }

    /// Adds a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Adds a provider-suggested retry delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    /// Returns `true` if the same strategy may be tried again.
    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }

    /// Returns `true` if the provider must not be used again within the task.
    pub fn excludes_provider(&self) -> bool {
        self.kind == ProviderErrorKind::Fatal
    }
}
