//! Tesseract local engine adapter.

use std::path::{Path, PathBuf};
use std::process::Output;

#[cfg(feature = "config")]
use clap::Args;
use nvisy_core::ServiceHealth;
use nvisy_core::content::{ContentType, ContentTypes};
use nvisy_core::document::DocumentFormat;
use nvisy_core::provider::{
    ProviderAdapter, ProviderClass, ProviderDescriptor, ProviderError, ProviderResult,
    ProviderRole, RecognizeRequest, Result,
};
use serde::{Deserialize, Serialize};

use super::{tsv, version_health, write_input};
use crate::{TRACING_TARGET_LOCAL, process};

/// Configuration for the Tesseract adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct TesseractConfig {
    /// Tesseract binary name or path.
    #[cfg_attr(
        feature = "config",
        arg(id = "tesseract_bin", long = "tesseract-bin", env = "TESSERACT_BIN", default_value = "tesseract")
    )]
    pub binary: String,

    /// Poppler `pdftoppm` binary used to rasterize PDF chunks.
    #[cfg_attr(
        feature = "config",
        arg(id = "pdftoppm_bin", long = "pdftoppm-bin", env = "PDFTOPPM_BIN", default_value = "pdftoppm")
    )]
    pub pdftoppm: String,

    /// Default recognition languages, `+` separated.
    #[cfg_attr(
        feature = "config",
        arg(id = "tesseract_languages", long = "tesseract-languages", env = "TESSERACT_LANGUAGES", default_value = "eng")
    )]
    pub languages: String,

    /// Rasterization resolution in DPI.
    #[cfg_attr(
        feature = "config",
        arg(id = "tesseract_dpi", long = "tesseract-dpi", env = "TESSERACT_DPI", default_value = "300")
    )]
    pub dpi: u32,

    /// Page segmentation mode passed as `--psm`.
    #[cfg_attr(
        feature = "config",
        arg(id = "tesseract_psm", long = "tesseract-psm", env = "TESSERACT_PSM", default_value = "3")
    )]
    pub page_segmentation_mode: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_owned(),
            pdftoppm: "pdftoppm".to_owned(),
            languages: "eng".to_owned(),
            dpi: 300,
            page_segmentation_mode: 3,
        }
    }
}

/// Local OCR engine: rasterizes PDF chunks with `pdftoppm`, then reads
/// words and confidences from `tesseract ... tsv`.
#[derive(Debug, Clone)]
pub struct Tesseract {
    config: TesseractConfig,
    descriptor: ProviderDescriptor,
}

impl Tesseract {
    /// Provider id.
    pub const ID: &'static str = "tesseract";

    pub fn new(config: TesseractConfig) -> Self {
        let descriptor = ProviderDescriptor::new(
            Self::ID,
            ProviderRole::LocalEngine,
            ProviderClass::Local,
            ContentTypes::new().with(ContentType::Text),
        );
        Self { config, descriptor }
    }

    /// Produces one image per chunk page, in page order.
    async fn page_images(&self, request: &RecognizeRequest) -> Result<Vec<PathBuf>> {
        if request.format.is_image() {
            let name = format!("input.{}", request.format.extension());
            return Ok(vec![write_input(&request.work_dir, &name, &request.chunk).await?]);
        }

        let pdf = write_input(&request.work_dir, "chunk.pdf", &request.chunk).await?;
        let dpi = request.configuration.dpi.unwrap_or(self.config.dpi);
        let prefix = request.work_dir.join("page");

        let mut command = process::command(&self.config.pdftoppm);
        command
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(&pdf)
            .arg(&prefix);
        process::run_checked(command, request.deadline).await?;

        let images = list_page_images(&request.work_dir).await?;
        if images.is_empty() {
            return Err(ProviderError::unsupported_input("pdftoppm produced no page images"));
        }
        Ok(images)
    }

    fn languages(&self, request: &RecognizeRequest) -> String {
        if request.configuration.languages.is_empty() {
            self.config.languages.clone()
        } else {
            request.configuration.languages.join("+")
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for Tesseract {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    #[tracing::instrument(
        target = TRACING_TARGET_LOCAL,
        skip_all,
        fields(provider = Self::ID, pages = %request.pages)
    )]
    async fn recognize(&self, request: RecognizeRequest) -> Result<ProviderResult> {
        if request.format == DocumentFormat::Webp {
            return Err(ProviderError::unsupported_input("tesseract cannot read webp"));
        }

        let started = std::time::Instant::now();
        let images = self.page_images(&request).await?;
        let languages = self.languages(&request);
        let psm = request
            .configuration
            .params
            .get("psm")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(u64::from(self.config.page_segmentation_mode));

        let mut elements = Vec::new();
        for (page, image) in images.iter().enumerate() {
            let mut command = process::command(&self.config.binary);
            command
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(&languages)
                .arg("--psm")
                .arg(psm.to_string())
                .arg("tsv");

            let output = process::run(command, request.deadline).await?;
            if !output.status.success() {
                return Err(classify_exit(&output));
            }
            elements.extend(tsv::parse(&String::from_utf8_lossy(&output.stdout), page as u32));
        }

        tracing::debug!(
            target: TRACING_TARGET_LOCAL,
            images = images.len(),
            elements = elements.len(),
            "recognized chunk"
        );

        let mut result = ProviderResult::new(self.descriptor.id.clone(), elements);
        result.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn health_check(&self) -> ServiceHealth {
        version_health(&self.config.binary).await
    }
}

/// Tesseract reports missing traineddata on stderr with a non-zero exit.
fn classify_exit(output: &Output) -> ProviderError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Failed loading language") || stderr.contains("Error opening data file") {
        return ProviderError::configuration(format!(
            "tesseract language data missing: {}",
            process::stderr_excerpt(output)
        ));
    }
    process::exit_error("tesseract", output)
}

/// Lists `page-N.png` files written by `pdftoppm`, ordered by N.
async fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error =
        |e: std::io::Error| ProviderError::transient("cannot list rasterized pages").with_source(e);

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let name = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|n| n.strip_prefix("page-"))
            .and_then(|n| n.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        pages.push((number, entry.path()));
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use nvisy_core::document::DocumentKind;

    use super::*;

    #[tokio::test]
    async fn lists_pages_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-02.png", "page-1.png", "chunk.pdf", "page-x.png"] {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }
        let pages = list_page_images(dir.path()).await.unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["page-1.png", "page-02.png", "page-10.png"]);
    }

    #[test]
    fn descriptor_is_local_text_engine() {
        let engine = Tesseract::new(TesseractConfig::default());
        let descriptor = engine.descriptor();
        assert_eq!(descriptor.class, ProviderClass::Local);
        assert!(descriptor.capabilities.contains(ContentType::Text));
        assert!(!descriptor.capabilities.contains(ContentType::Tables));
        assert!(descriptor.supports(DocumentKind::Scanned));
    }
}
