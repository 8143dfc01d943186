//! Recognition requests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::content::ContentTypes;
use crate::document::{DocumentFormat, PageRange};

/// Provider-specific parameters of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Named preset, e.g. `generic`, `tables`, `schematic`.
    pub preset: String,
    /// Recognition languages, ISO 639-2 codes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Rasterization resolution for engines that need page images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    /// Free-form parameters passed through to the provider.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Configuration {
    /// Name of the preset used when nothing more specific applies.
    pub const GENERIC: &'static str = "generic";

    pub fn new(preset: impl Into<String>) -> Self {
        Self {
            preset: preset.into(),
            languages: Vec::new(),
            dpi: None,
            params: BTreeMap::new(),
        }
    }

    /// The generic configuration.
    pub fn generic() -> Self {
        Self::new(Self::GENERIC)
    }

    pub fn with_languages(mut self, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::generic()
    }
}

/// A single recognition call for one chunk.
#[derive(Debug, Clone)]
pub struct RecognizeRequest {
    /// The chunk payload: a standalone PDF of the chunk pages, or an image.
    pub chunk: Bytes,
    /// Format of `chunk`.
    pub format: DocumentFormat,
    /// Absolute pages covered by the chunk.
    pub pages: PageRange,
    /// Content types the caller wants extracted.
    pub content_types: ContentTypes,
    pub configuration: Configuration,
    /// Point in time by which the adapter must return.
    pub deadline: Instant,
    /// Scoped working directory for intermediate artifacts, owned by the caller.
    pub work_dir: PathBuf,
}

impl RecognizeRequest {
    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
