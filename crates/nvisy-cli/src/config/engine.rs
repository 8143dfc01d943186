//! Engine tuning options.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use nvisy_runtime::engine::{DEFAULT_CHUNK_PAGES, DEFAULT_MAX_ATTEMPTS, EngineConfig};
use nvisy_runtime::quality::{Lexicon, PerContentType, WordListLexicon};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Worker pool, chunking, acceptance thresholds and deadlines.
///
/// Unset options keep the engine defaults.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct EngineArgs {
    /// Number of workers; defaults to the available cores.
    #[arg(long, env = "NVISY_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Maximum concurrent calls to cloud providers.
    #[arg(long, env = "NVISY_CLOUD_CONCURRENCY", default_value_t = 4)]
    pub cloud_concurrency: usize,

    /// Maximum pages per chunk.
    #[arg(long, env = "NVISY_CHUNK_PAGES", default_value_t = DEFAULT_CHUNK_PAGES)]
    pub chunk_pages: u32,

    /// Maximum attempts per chunk.
    #[arg(long, env = "NVISY_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Acceptance threshold for text.
    #[arg(long, env = "NVISY_TEXT_THRESHOLD", default_value_t = 0.75)]
    pub text_threshold: f32,

    /// Acceptance threshold for tables.
    #[arg(long, env = "NVISY_TABLES_THRESHOLD", default_value_t = 0.75)]
    pub tables_threshold: f32,

    /// Acceptance threshold for formulas.
    #[arg(long, env = "NVISY_FORMULAS_THRESHOLD", default_value_t = 0.60)]
    pub formulas_threshold: f32,

    /// Acceptance threshold for schematics.
    #[arg(long, env = "NVISY_SCHEMATICS_THRESHOLD", default_value_t = 0.60)]
    pub schematics_threshold: f32,

    /// Word list used to recognize dictionary words, one per line.
    #[arg(long, env = "NVISY_WORD_LIST")]
    pub word_list: Option<PathBuf>,

    /// Languages assumed when a document declares none, comma separated.
    #[arg(long, env = "NVISY_DEFAULT_LANGUAGES", value_delimiter = ',', default_value = "eng")]
    pub default_languages: Vec<String>,

    /// Base deadline of a cloud provider call, in seconds.
    #[arg(long, env = "NVISY_CLOUD_DEADLINE_SECS")]
    pub cloud_deadline_secs: Option<u64>,

    /// Base deadline of a local engine call, in seconds.
    #[arg(long, env = "NVISY_LOCAL_DEADLINE_SECS")]
    pub local_deadline_secs: Option<u64>,

    /// Directory holding per-attempt scratch directories.
    #[arg(long, env = "NVISY_WORK_ROOT")]
    pub work_root: Option<PathBuf>,
}

impl EngineArgs {
    /// Checks the ranges clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        let thresholds = [
            ("text", self.text_threshold),
            ("tables", self.tables_threshold),
            ("formulas", self.formulas_threshold),
            ("schematics", self.schematics_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} threshold must be within [0, 1], got {value}");
            }
        }
        if self.default_languages.iter().all(|lang| lang.trim().is_empty()) {
            anyhow::bail!("at least one default language is required");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> PerContentType {
        PerContentType {
            text: self.text_threshold,
            tables: self.tables_threshold,
            formulas: self.formulas_threshold,
            schematics: self.schematics_threshold,
        }
    }

    /// Builds the engine configuration, loading the word list if one is set.
    pub async fn build(&self) -> anyhow::Result<EngineConfig> {
        let mut builder = EngineConfig::builder();
        builder
            .cloud_concurrency(self.cloud_concurrency)
            .chunk_pages(self.chunk_pages)
            .max_attempts(self.max_attempts)
            .thresholds(self.thresholds())
            .default_languages(self.default_languages.clone());

        if let Some(concurrency) = self.concurrency {
            builder.concurrency(concurrency);
        }
        if let Some(secs) = self.cloud_deadline_secs {
            builder.cloud_deadline_base(Duration::from_secs(secs));
        }
        if let Some(secs) = self.local_deadline_secs {
            builder.local_deadline_base(Duration::from_secs(secs));
        }
        if let Some(work_root) = &self.work_root {
            builder.work_root(work_root.clone());
        }
        if let Some(path) = &self.word_list {
            let words = WordListLexicon::load(path)
                .await
                .context("failed to load word list")?;
            tracing::info!(
                target: TRACING_TARGET_CONFIG,
                path = %path.display(),
                words = words.len(),
                "Loaded word list"
            );
            let lexicon: Arc<dyn Lexicon> = Arc::new(words);
            builder.lexicon(lexicon);
        }

        builder.build().context("invalid engine configuration")
    }

    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            concurrency = ?self.concurrency,
            cloud_concurrency = self.cloud_concurrency,
            chunk_pages = self.chunk_pages,
            max_attempts = self.max_attempts,
            text_threshold = self.text_threshold,
            tables_threshold = self.tables_threshold,
            formulas_threshold = self.formulas_threshold,
            schematics_threshold = self.schematics_threshold,
            word_list = ?self.word_list,
            "Engine configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[clap(flatten)]
        engine: EngineArgs,
    }

    fn parse(args: &[&str]) -> EngineArgs {
        let argv = std::iter::once("nvisy").chain(args.iter().copied());
        Harness::try_parse_from(argv).unwrap().engine
    }

    #[tokio::test]
    async fn defaults_match_the_engine() {
        let config = parse(&[]).build().await.unwrap();
        let defaults = EngineConfig::default();
        assert_eq!(config.chunk_pages, defaults.chunk_pages);
        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.cloud_concurrency, defaults.cloud_concurrency);
        assert_eq!(config.thresholds, defaults.thresholds);
    }

    #[tokio::test]
    async fn loads_word_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "# domain words\nresistor\ncapacitor\n").unwrap();

        let args = parse(&["--word-list", path.to_str().unwrap(), "--chunk-pages", "2"]);
        let config = args.build().await.unwrap();
        assert_eq!(config.chunk_pages, 2);
        assert!(config.lexicon.contains("Resistor"));
        assert!(!config.lexicon.contains("banana"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let args = parse(&["--text-threshold", "1.5"]);
        assert!(args.validate().is_err());
    }

    #[tokio::test]
    async fn zero_chunk_pages_is_rejected_by_the_builder() {
        let args = parse(&["--chunk-pages", "0"]);
        assert!(args.build().await.is_err());
    }
}
