//! Scripted providers for testing.
//!
//! [`ScriptedProvider`] answers every call from a closure, so a test decides
//! exactly what each attempt returns. Responses are a pure function of the
//! request and the call index, which keeps runs reproducible across a
//! simulated crash and recovery.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! nvisy-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nvisy_core::mock::{Scripted, ScriptedProvider, fixtures};
//!
//! let provider = ScriptedProvider::new(descriptor, |request, _call| {
//!     Scripted::Elements(fixtures::text_pages(request.pages.len(), 0.0))
//! });
//! ```

pub mod fixtures;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::content::{ContentElement, ContentTypes};
use crate::health::ServiceHealth;
use crate::provider::{
    ProviderAdapter, ProviderClass, ProviderDescriptor, ProviderError, ProviderErrorKind,
    ProviderResult, ProviderRole, RecognizeRequest, Result,
};

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return these chunk-relative elements.
    Elements(Vec<ContentElement>),
    /// Fail with an error of this kind.
    Fail(ProviderErrorKind),
    /// Never answer; the call ends with a transient error at its deadline.
    Hang,
}

type Script = dyn Fn(&RecognizeRequest, usize) -> Scripted + Send + Sync;

/// Deterministic [`ProviderAdapter`] driven by a closure.
#[derive(Clone)]
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Arc<Script>,
    calls: Arc<AtomicUsize>,
    latency: Option<Duration>,
    health: ServiceHealth,
}

impl ScriptedProvider {
    /// Creates a provider answering with `script(request, call_index)`.
    pub fn new<F>(descriptor: ProviderDescriptor, script: F) -> Self
    where
        F: Fn(&RecognizeRequest, usize) -> Scripted + Send + Sync + 'static,
    {
        Self {
            descriptor,
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
            latency: None,
            health: ServiceHealth::healthy(),
        }
    }

    /// Creates a provider replaying `steps` in order, repeating the last one.
    pub fn sequence(descriptor: ProviderDescriptor, steps: Vec<Scripted>) -> Self {
        Self::new(descriptor, move |_, call| {
            steps
                .get(call)
                .or_else(|| steps.last())
                .cloned()
                .unwrap_or(Scripted::Elements(Vec::new()))
        })
    }

    /// A descriptor for a zero-cost local provider with every capability.
    pub fn local_descriptor(id: &str) -> ProviderDescriptor {
        ProviderDescriptor::new(id, ProviderRole::LocalEngine, ProviderClass::Local, ContentTypes::all())
    }

    /// A descriptor for a cloud provider with every capability.
    pub fn cloud_descriptor(id: &str, role: ProviderRole, cost_per_page: f32) -> ProviderDescriptor {
        ProviderDescriptor::new(id, role, ProviderClass::Cloud, ContentTypes::all())
            .with_cost_per_page(cost_per_page)
    }

    /// Delays every successful answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reports `health` from [`ProviderAdapter::health_check`].
    pub fn with_health(mut self, health: ServiceHealth) -> Self {
        self.health = health;
        self
    }

    /// Number of `recognize` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared call counter, readable after the provider was moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("id", &self.descriptor.id)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn recognize(&self, request: RecognizeRequest) -> Result<ProviderResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(&request, call) {
            Scripted::Elements(elements) => {
                if let Some(latency) = self.latency {
                    let allowed = request.remaining();
                    if latency > allowed {
                        tokio::time::sleep(allowed).await;
                        return Err(ProviderError::deadline_exceeded(allowed));
                    }
                    tokio::time::sleep(latency).await;
                }
                Ok(ProviderResult::new(self.descriptor.id.clone(), elements))
            }
            Scripted::Fail(kind) => Err(ProviderError::new(kind, format!("scripted {kind} failure"))),
            Scripted::Hang => {
                let allowed = request.remaining();
                tokio::time::sleep_until(request.deadline).await;
                Err(ProviderError::deadline_exceeded(allowed))
            }
        }
    }

    async fn health_check(&self) -> ServiceHealth {
        self.health.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::document::{DocumentFormat, PageRange};
    use crate::provider::Configuration;

    fn request(deadline: Duration) -> RecognizeRequest {
        RecognizeRequest {
            chunk: Bytes::new(),
            format: DocumentFormat::Pdf,
            pages: PageRange::new(0, 2),
            content_types: ContentTypes::text(),
            configuration: Configuration::generic(),
            deadline: Instant::now() + deadline,
            work_dir: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn sequence_repeats_last_step() {
        let provider = ScriptedProvider::sequence(
            ScriptedProvider::local_descriptor("stub"),
            vec![
                Scripted::Fail(ProviderErrorKind::Transient),
                Scripted::Elements(fixtures::text_pages(2, 0.0)),
            ],
        );

        let first = provider.recognize(request(Duration::from_secs(1))).await;
        assert!(first.unwrap_err().is_retryable());
        for _ in 0..2 {
            let result = provider.recognize(request(Duration::from_secs(1))).await.unwrap();
            assert_eq!(result.elements.len(), 2);
        }
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_ends_at_deadline() {
        let provider = ScriptedProvider::sequence(
            ScriptedProvider::local_descriptor("stub"),
            vec![Scripted::Hang],
        );
        let error = provider
            .recognize(request(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ProviderErrorKind::Transient);
    }
}
