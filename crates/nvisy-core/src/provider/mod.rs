//! Provider adapter contract.
//!
//! A provider adapter wraps one recognition backend: a local OCR engine run
//! as a subprocess, or a cloud HTTP service. Adapters are shared between
//! workers and must be safe to call concurrently for independent chunks.

use std::sync::Arc;

mod descriptor;
mod error;
mod request;
mod result;

pub use descriptor::{ProviderClass, ProviderDescriptor, ProviderId, ProviderRole};
pub use error::{ProviderError, ProviderErrorKind, Result};
pub use request::{Configuration, RecognizeRequest};
pub use result::{ProviderMetadata, ProviderResult};

use crate::health::ServiceHealth;

/// Tracing target for provider operations.
pub const TRACING_TARGET: &str = "nvisy_core::provider";

/// Type alias for a shared provider adapter.
pub type BoxedProvider = Arc<dyn ProviderAdapter>;

/// A recognition backend.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the static description of this provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Recognizes the content of one chunk.
    ///
    /// Implementations must return by `request.deadline`; adapters that spawn
    /// subprocesses kill them when the deadline passes and report a
    /// [`ProviderErrorKind::Transient`] error. Page indices in the result are
    /// relative to the first page of the chunk. Intermediate files go into
    /// `request.work_dir`, which the caller removes afterwards.
    async fn recognize(&self, request: RecognizeRequest) -> Result<ProviderResult>;

    /// Checks whether the provider can currently be used.
    async fn health_check(&self) -> ServiceHealth {
        ServiceHealth::healthy()
    }

    /// Shorthand for `self.descriptor().id`.
    fn id(&self) -> &ProviderId {
        &self.descriptor().id
    }
}
