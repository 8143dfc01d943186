//! Recognition results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ProviderId;
use crate::content::{ContentElement, ContentType};

/// Metadata reported alongside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider: ProviderId,
    /// Wall-clock time the provider spent.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProviderMetadata {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            elapsed_ms: 0,
            detected_language: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Elements extracted by one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub elements: Vec<ContentElement>,
    pub metadata: ProviderMetadata,
}

impl ProviderResult {
    pub fn new(provider: ProviderId, elements: Vec<ContentElement>) -> Self {
        Self {
            elements,
            metadata: ProviderMetadata::new(provider),
        }
    }

    /// Iterates the elements of one content type.
    pub fn elements_of(&self, content_type: ContentType) -> impl Iterator<Item = &ContentElement> {
        self.elements
            .iter()
            .filter(move |element| element.content_type() == content_type)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Converts chunk-relative pages to absolute pages.
    pub fn offset_pages(mut self, offset: u32) -> Self {
        self.elements = self
            .elements
            .into_iter()
            .map(|element| element.offset_pages(offset))
            .collect();
        self
    }
}
