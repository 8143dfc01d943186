//! Provider configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::cloud::{DocumentStructureConfig, ImageUnderstandingConfig};
use crate::local::{OcrMyPdfConfig, TesseractConfig};

/// Configuration of every provider the registry may build.
///
/// Local engines are enabled by flag; cloud services are enabled by setting
/// their URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ProvidersConfig {
    /// Register the Tesseract local engine.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "tesseract",
            env = "NVISY_TESSERACT",
            default_value_t = true,
            action = clap::ArgAction::Set
        )
    )]
    pub tesseract_enabled: bool,

    /// Register the OCRmyPDF searchable-PDF tool.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "ocrmypdf",
            env = "NVISY_OCRMYPDF",
            default_value_t = false,
            action = clap::ArgAction::Set
        )
    )]
    pub ocrmypdf_enabled: bool,

    #[cfg_attr(feature = "config", clap(flatten))]
    pub tesseract: TesseractConfig,

    #[cfg_attr(feature = "config", clap(flatten))]
    pub ocrmypdf: OcrMyPdfConfig,

    #[cfg_attr(feature = "config", clap(flatten))]
    pub structure: DocumentStructureConfig,

    #[cfg_attr(feature = "config", clap(flatten))]
    pub vision: ImageUnderstandingConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            tesseract_enabled: true,
            ocrmypdf_enabled: false,
            tesseract: TesseractConfig::default(),
            ocrmypdf: OcrMyPdfConfig::default(),
            structure: DocumentStructureConfig::default(),
            vision: ImageUnderstandingConfig::default(),
        }
    }
}
