//! Local engines run as subprocesses.

mod ocrmypdf;
mod tesseract;
mod tsv;

use std::path::{Path, PathBuf};
use std::time::Duration;

use nvisy_core::ServiceHealth;
use nvisy_core::provider::{ProviderError, Result};
use tokio::time::Instant;

pub use self::ocrmypdf::{OcrMyPdf, OcrMyPdfConfig};
pub use self::tesseract::{Tesseract, TesseractConfig};
use crate::process;

/// Deadline used by health checks.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes the chunk payload into the working directory.
async fn write_input(work_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = work_dir.join(file_name);
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        ProviderError::transient(format!("cannot write {}", path.display())).with_source(e)
    })?;
    Ok(path)
}

/// Runs `<binary> --version` and reports the first line.
async fn version_health(binary: &str) -> ServiceHealth {
    let started = std::time::Instant::now();
    let mut command = process::command(binary);
    command.arg("--version");

    match process::run(command, Instant::now() + HEALTH_CHECK_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            // Some engines print the version banner on stderr.
            let banner = if output.stdout.is_empty() {
                &output.stderr
            } else {
                &output.stdout
            };
            let version = String::from_utf8_lossy(banner)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_owned();
            let mut health = ServiceHealth::healthy().with_latency(started.elapsed());
            if !version.is_empty() {
                health.message = Some(version);
            }
            health
        }
        Ok(output) => ServiceHealth::unhealthy(format!(
            "'{binary} --version' failed: {}",
            process::stderr_excerpt(&output)
        )),
        Err(e) => ServiceHealth::unhealthy(e.to_string()),
    }
}
