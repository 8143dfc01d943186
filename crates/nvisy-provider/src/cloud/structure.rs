//! Cloud document-structure service: layout, tables and formulas.

#[cfg(feature = "config")]
use clap::Args;
use nvisy_core::ServiceHealth;
use nvisy_core::content::{ContentType, ContentTypes};
use nvisy_core::provider::{
    ProviderAdapter, ProviderClass, ProviderDescriptor, ProviderResult, ProviderRole,
    RecognizeRequest, Result,
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CloudClient, recognize_chunk};
use crate::TRACING_TARGET_CLOUD;

/// Configuration for the document-structure service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct DocumentStructureConfig {
    /// Base URL of the service; the adapter is disabled when unset.
    #[cfg_attr(feature = "config", arg(id = "structure_url", long = "structure-url", env = "STRUCTURE_API_URL"))]
    pub url: Option<Url>,

    /// Pre-authorized bearer credential.
    #[cfg_attr(feature = "config", arg(id = "structure_api_key", long = "structure-api-key", env = "STRUCTURE_API_KEY"))]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Declared cost per page.
    #[cfg_attr(
        feature = "config",
        arg(id = "structure_cost_per_page", long = "structure-cost-per-page", env = "STRUCTURE_COST_PER_PAGE", default_value = "0.01")
    )]
    #[serde(default)]
    pub cost_per_page: f32,
}

/// Adapter for the document-structure service.
#[derive(Debug, Clone)]
pub struct DocumentStructure {
    client: CloudClient,
    descriptor: ProviderDescriptor,
}

impl DocumentStructure {
    /// Provider id.
    pub const ID: &'static str = "document-structure";

    const ENDPOINT: &'static str = "v1/structure";

    pub fn new(url: Url, api_key: Option<&str>, cost_per_page: f32) -> crate::Result<Self> {
        let descriptor = ProviderDescriptor::new(
            Self::ID,
            ProviderRole::DocumentStructure,
            ProviderClass::Cloud,
            ContentTypes::text()
                .with(ContentType::Tables)
                .with(ContentType::Formulas),
        )
        .with_cost_per_page(cost_per_page);
        let client = CloudClient::new(descriptor.id.clone(), url, api_key)?;
        Ok(Self { client, descriptor })
    }

    /// Builds the adapter when a URL is configured.
    pub fn from_config(config: &DocumentStructureConfig) -> crate::Result<Option<Self>> {
        config
            .url
            .clone()
            .map(|url| Self::new(url, config.api_key.as_deref(), config.cost_per_page))
            .transpose()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for DocumentStructure {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    #[tracing::instrument(
        target = TRACING_TARGET_CLOUD,
        skip_all,
        fields(provider = Self::ID, pages = %request.pages)
    )]
    async fn recognize(&self, request: RecognizeRequest) -> Result<ProviderResult> {
        recognize_chunk(&self.client, Self::ENDPOINT, &request).await
    }

    async fn health_check(&self) -> ServiceHealth {
        self.client.health().await
    }
}
