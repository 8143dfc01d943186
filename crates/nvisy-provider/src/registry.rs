//! Provider registry resolved at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use nvisy_core::ServiceHealth;
use nvisy_core::provider::{BoxedProvider, ProviderAdapter, ProviderDescriptor, ProviderId};

use crate::cloud::{DocumentStructure, ImageUnderstanding};
use crate::local::{OcrMyPdf, Tesseract};
use crate::{Error, ProvidersConfig, Result};

/// Tracing target for registry operations.
const TRACING_TARGET: &str = "nvisy_provider::registry";

/// Immutable set of providers keyed by id.
///
/// Iteration order is by id, which keeps strategy ranking deterministic.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, BoxedProvider>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every provider enabled in `config`.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::new();
        if config.tesseract_enabled {
            registry.register(Tesseract::new(config.tesseract.clone()))?;
        }
        if config.ocrmypdf_enabled {
            registry.register(OcrMyPdf::new(config.ocrmypdf.clone()))?;
        }
        if let Some(structure) = DocumentStructure::from_config(&config.structure)? {
            registry.register(structure)?;
        }
        if let Some(vision) = ImageUnderstanding::from_config(&config.vision)? {
            registry.register(vision)?;
        }

        tracing::info!(
            target: TRACING_TARGET,
            providers = ?registry.ids().collect::<Vec<_>>(),
            "provider registry built"
        );
        Ok(registry)
    }

    /// Adds a provider; ids must be unique.
    pub fn register(&mut self, provider: impl ProviderAdapter + 'static) -> Result<()> {
        self.register_shared(Arc::new(provider))
    }

    /// Adds an already shared provider.
    pub fn register_shared(&mut self, provider: BoxedProvider) -> Result<()> {
        let id = provider.descriptor().id.clone();
        if self.providers.contains_key(&id) {
            return Err(Error::Duplicate(id));
        }
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, provider: impl ProviderAdapter + 'static) -> Result<Self> {
        self.register(provider)?;
        Ok(self)
    }

    pub fn get(&self, id: &ProviderId) -> Option<&BoxedProvider> {
        self.providers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
        self.providers.keys()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.values().map(|provider| provider.descriptor())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Checks every provider concurrently.
    pub async fn health(&self) -> Vec<(ProviderId, ServiceHealth)> {
        let checks = self.providers.iter().map(|(id, provider)| async move {
            (id.clone(), provider.health_check().await)
        });
        join_all(checks).await
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
