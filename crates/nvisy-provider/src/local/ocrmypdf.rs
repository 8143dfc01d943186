//! OCRmyPDF searchable-PDF adapter.
//!
//! Produces a searchable PDF in the working directory and reads the plain
//! text sidecar. The sidecar separates pages with form feeds; paragraphs are
//! separated by blank lines and become individual spans.

use std::process::Output;

#[cfg(feature = "config")]
use clap::Args;
use nvisy_core::ServiceHealth;
use nvisy_core::content::{ContentElement, ContentType, ContentTypes, Position, TextSpan};
use nvisy_core::provider::{
    ProviderAdapter, ProviderClass, ProviderDescriptor, ProviderError, ProviderResult,
    ProviderRole, RecognizeRequest, Result,
};
use serde::{Deserialize, Serialize};

use super::{version_health, write_input};
use crate::{TRACING_TARGET_LOCAL, process};

const PAGE_SEPARATOR: char = '\x0c';

/// Configuration for the OCRmyPDF adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct OcrMyPdfConfig {
    /// OCRmyPDF binary name or path.
    #[cfg_attr(
        feature = "config",
        arg(id = "ocrmypdf_bin", long = "ocrmypdf-bin", env = "OCRMYPDF_BIN", default_value = "ocrmypdf")
    )]
    pub binary: String,

    /// Default recognition languages, `+` separated.
    #[cfg_attr(
        feature = "config",
        arg(id = "ocrmypdf_languages", long = "ocrmypdf-languages", env = "OCRMYPDF_LANGUAGES", default_value = "eng")
    )]
    pub languages: String,

    /// Worker processes OCRmyPDF may use per call.
    #[cfg_attr(
        feature = "config",
        arg(id = "ocrmypdf_jobs", long = "ocrmypdf-jobs", env = "OCRMYPDF_JOBS", default_value = "1")
    )]
    pub jobs: u32,

    /// DPI assumed for image inputs without resolution metadata.
    #[cfg_attr(
        feature = "config",
        arg(id = "ocrmypdf_image_dpi", long = "ocrmypdf-image-dpi", env = "OCRMYPDF_IMAGE_DPI", default_value = "300")
    )]
    pub image_dpi: u32,
}

impl Default for OcrMyPdfConfig {
    fn default() -> Self {
        Self {
            binary: "ocrmypdf".to_owned(),
            languages: "eng".to_owned(),
            jobs: 1,
            image_dpi: 300,
        }
    }
}

/// Local OCR-to-searchable-PDF tool.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    config: OcrMyPdfConfig,
    descriptor: ProviderDescriptor,
}

impl OcrMyPdf {
    /// Provider id.
    pub const ID: &'static str = "ocrmypdf";

    pub fn new(config: OcrMyPdfConfig) -> Self {
        let descriptor = ProviderDescriptor::new(
            Self::ID,
            ProviderRole::SearchablePdf,
            ProviderClass::Local,
            ContentTypes::new().with(ContentType::Text),
        );
        Self { config, descriptor }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OcrMyPdf {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    #[tracing::instrument(
        target = TRACING_TARGET_LOCAL,
        skip_all,
        fields(provider = Self::ID, pages = %request.pages)
    )]
    async fn recognize(&self, request: RecognizeRequest) -> Result<ProviderResult> {
        let started = std::time::Instant::now();
        let input_name = format!("input.{}", request.format.extension());
        let input = write_input(&request.work_dir, &input_name, &request.chunk).await?;
        let output_pdf = request.work_dir.join("searchable.pdf");
        let sidecar = request.work_dir.join("sidecar.txt");

        let languages = if request.configuration.languages.is_empty() {
            self.config.languages.clone()
        } else {
            request.configuration.languages.join("+")
        };

        let mut command = process::command(&self.config.binary);
        command
            .arg("--force-ocr")
            .arg("--jobs")
            .arg(self.config.jobs.to_string())
            .arg("-l")
            .arg(&languages)
            .arg("--sidecar")
            .arg(&sidecar);
        if request.format.is_image() {
            command
                .arg("--image-dpi")
                .arg(self.config.image_dpi.to_string());
        }
        command.arg(&input).arg(&output_pdf);

        let output = process::run(command, request.deadline).await?;
        if !output.status.success() {
            return Err(classify_exit(&output));
        }

        let text = tokio::fs::read_to_string(&sidecar).await.map_err(|e| {
            ProviderError::transient("ocrmypdf did not write a sidecar").with_source(e)
        })?;
        let elements = parse_sidecar(&text);

        tracing::debug!(
            target: TRACING_TARGET_LOCAL,
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

/// Splits sidecar text into one span per paragraph, pages relative to the chunk.
fn parse_sidecar(text: &str) -> Vec<ContentElement> {
    let mut elements = Vec::new();
    for (page, page_text) in text.split(PAGE_SEPARATOR).enumerate() {
        let paragraphs = page_text
            .split("\n\n")
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty());
        for (order, paragraph) in paragraphs.enumerate() {
            elements.push(ContentElement::Text(TextSpan::plain(
                Position::new(page as u32, order as u32),
                paragraph,
                None,
            )));
        }
    }
    elements
}

/// Maps OCRmyPDF exit codes onto the provider taxonomy.
fn classify_exit(output: &Output) -> ProviderError {
    let detail = process::stderr_excerpt(output);
    match output.status.code() {
        // bad arguments, missing dependency, invalid tesseract config
        Some(1 | 3 | 9) => ProviderError::configuration(format!("ocrmypdf: {detail}")),
        // unreadable input, encrypted PDF
        Some(2 | 8) => ProviderError::unsupported_input(format!("ocrmypdf: {detail}")),
        // invalid output, file access, PDF/A conversion, interrupted
        Some(4 | 5 | 10 | 130) => ProviderError::transient(format!("ocrmypdf: {detail}")),
        // child process error, other error
        Some(7 | 15) | None => ProviderError::fatal(format!("ocrmypdf crashed: {detail}")),
        Some(_) => process::exit_error("ocrmypdf", output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_pages_and_paragraphs() {
        let text = "Title line\nwrapped here\n\nSecond paragraph\n\x0c\x0cLast page\n";
        let elements = parse_sidecar(text);
        assert_eq!(elements.len(), 3);

        let ContentElement::Text(first) = &elements[0] else {
            panic!("expected text");
        };
        assert_eq!(first.text, "Title line wrapped here");
        assert_eq!(elements[1].position(), Position::new(0, 1));
        assert_eq!(elements[2].position(), Position::new(2, 0));
    }

    #[cfg(unix)]
    #[test]
    fn exit_codes() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        use nvisy_core::provider::ProviderErrorKind;

        let output = |code: i32| Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: b"details".to_vec(),
        };
        assert_eq!(classify_exit(&output(8)).kind(), ProviderErrorKind::UnsupportedInput);
        assert_eq!(classify_exit(&output(3)).kind(), ProviderErrorKind::Configuration);
        assert_eq!(classify_exit(&output(5)).kind(), ProviderErrorKind::Transient);
        assert_eq!(classify_exit(&output(15)).kind(), ProviderErrorKind::Fatal);
    }
}
