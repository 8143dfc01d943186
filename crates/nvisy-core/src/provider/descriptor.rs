//! Static provider descriptions read by the strategy selector.

use derive_more::{AsRef, Display, From};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::content::ContentTypes;
use crate::document::DocumentKind;

/// Stable provider identifier, e.g. `tesseract` or `document-structure`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(AsRef, Display, From)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// What kind of recognizer a provider is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    /// Local OCR engine run as a subprocess.
    LocalEngine,
    /// Local tool that produces a searchable PDF plus a text sidecar.
    SearchablePdf,
    /// Cloud service specialized in layout, tables and formulas.
    DocumentStructure,
    /// Cloud vision model able to read drawings and schematics.
    ImageUnderstanding,
}

/// Where a provider runs. Cloud providers get longer deadlines and share an
/// additional concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderClass {
    Local,
    Cloud,
}

/// Declared properties of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub role: ProviderRole,
    pub class: ProviderClass,
    /// Content types the provider can extract.
    pub capabilities: ContentTypes,
    /// Document kinds the provider accepts.
    pub supported_kinds: Vec<DocumentKind>,
    /// Declared cost per page, used to break ranking ties.
    pub cost_per_page: f32,
}

impl ProviderDescriptor {
    /// Creates a descriptor accepting every document kind at zero cost.
    pub fn new(
        id: impl Into<ProviderId>,
        role: ProviderRole,
        class: ProviderClass,
        capabilities: ContentTypes,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            class,
            capabilities,
            supported_kinds: vec![
                DocumentKind::BornDigital,
                DocumentKind::Scanned,
                DocumentKind::Image,
                DocumentKind::MixedTechnical,
            ],
            cost_per_page: 0.0,
        }
    }

    pub fn with_supported_kinds(mut self, kinds: impl IntoIterator<Item = DocumentKind>) -> Self {
        self.supported_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_cost_per_page(mut self, cost: f32) -> Self {
        self.cost_per_page = cost;
        self
    }

    /// Returns `true` if the provider accepts documents of `kind`.
    pub fn supports(&self, kind: DocumentKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    pub fn is_cloud(&self) -> bool {
        self.class == ProviderClass::Cloud
    }
}
