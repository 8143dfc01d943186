//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use nvisy_core::provider::ProviderClass;

use crate::quality::{HeuristicLexicon, Lexicon, PerContentType};

/// Default number of pages per chunk.
pub const DEFAULT_CHUNK_PAGES: u32 = 5;

/// Default attempt budget per chunk.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for the task manager and everything it drives.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Number of workers pulling chunk attempts from the queue.
    #[builder(default = "default_concurrency()")]
    pub concurrency: usize,

    /// Maximum concurrent calls to cloud-class providers.
    #[builder(default = "4")]
    pub cloud_concurrency: usize,

    /// Maximum pages per chunk.
    #[builder(default = "DEFAULT_CHUNK_PAGES")]
    pub chunk_pages: u32,

    /// Maximum attempts per chunk across all strategies.
    #[builder(default = "DEFAULT_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Transient failures a single strategy may retry before escalating.
    #[builder(default = "1")]
    pub transient_retries: u32,

    /// First backoff delay after a transient failure.
    #[builder(default = "Duration::from_millis(500)")]
    pub backoff_initial: Duration,

    /// Upper bound for backoff delays.
    #[builder(default = "Duration::from_secs(10)")]
    pub backoff_max: Duration,

    /// Acceptance threshold per content type.
    #[builder(default = "PerContentType::thresholds()")]
    pub thresholds: PerContentType,

    /// Weight of each content type in the overall score.
    #[builder(default = "PerContentType::uniform(1.0)")]
    pub weights: PerContentType,

    /// Words below this confidence count as low confidence characters.
    #[builder(default = "0.6")]
    pub word_confidence_floor: f32,

    /// Schematic symbols below this confidence are not counted as detected.
    #[builder(default = "0.5")]
    pub symbol_confidence_floor: f32,

    /// Dictionary used by the text heuristic.
    #[builder(default = "Arc::new(HeuristicLexicon)")]
    pub lexicon: Arc<dyn Lexicon>,

    /// Smoothing factor of the provider success rate.
    #[builder(default = "0.2")]
    pub ema_alpha: f32,

    /// Share of static suitability in a strategy score; the rest is history.
    #[builder(default = "0.6")]
    pub static_weight: f32,

    /// Fixed part of a local provider deadline.
    #[builder(default = "Duration::from_secs(30)")]
    pub local_deadline_base: Duration,

    /// Per-page part of a local provider deadline.
    #[builder(default = "Duration::from_secs(20)")]
    pub local_deadline_per_page: Duration,

    /// Fixed part of a cloud provider deadline.
    #[builder(default = "Duration::from_secs(60)")]
    pub cloud_deadline_base: Duration,

    /// Per-page part of a cloud provider deadline.
    #[builder(default = "Duration::from_secs(30)")]
    pub cloud_deadline_per_page: Duration,

    /// Extra time granted to an adapter past its deadline before the call is
    /// abandoned.
    #[builder(default = "Duration::from_secs(5)")]
    pub deadline_grace: Duration,

    /// Languages assumed when a submission declares none.
    #[builder(default = "vec![\"eng\".to_owned()]")]
    pub default_languages: Vec<String>,

    /// Directory under which per-attempt working directories are created.
    #[builder(default = "std::env::temp_dir().join(\"nvisy\")")]
    pub work_root: PathBuf,
}

impl EngineConfig {
    /// Returns a builder with every field at its default.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Deadline allowance for one attempt over `pages` pages.
    pub fn attempt_timeout(&self, class: ProviderClass, pages: u32) -> Duration {
        let (base, per_page) = match class {
            ProviderClass::Local => (self.local_deadline_base, self.local_deadline_per_page),
            ProviderClass::Cloud => (self.cloud_deadline_base, self.cloud_deadline_per_page),
        };
        base + per_page * pages.max(1)
    }
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("concurrency must be at least 1".into());
        }
        if self.cloud_concurrency == Some(0) {
            return Err("cloud_concurrency must be at least 1".into());
        }
        if self.chunk_pages == Some(0) {
            return Err("chunk_pages must be at least 1".into());
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".into());
        }
        if let Some(alpha) = self.ema_alpha
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            return Err("ema_alpha must be in (0, 1]".into());
        }
        if let Some(weight) = self.static_weight
            && !(0.0..=1.0).contains(&weight)
        {
            return Err("static_weight must be in [0, 1]".into());
        }
        if let Some(thresholds) = &self.thresholds
            && !thresholds.values().all(|value| (0.0..=1.0).contains(&value))
        {
            return Err("thresholds must be in [0, 1]".into());
        }
        if let Some(weights) = &self.weights
            && weights.values().any(|value| value < 0.0)
        {
            return Err("weights must not be negative".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            cloud_concurrency: 4,
            chunk_pages: DEFAULT_CHUNK_PAGES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transient_retries: 1,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
            thresholds: PerContentType::thresholds(),
            weights: PerContentType::uniform(1.0),
            word_confidence_floor: 0.6,
            symbol_confidence_floor: 0.5,
            lexicon: Arc::new(HeuristicLexicon),
            ema_alpha: 0.2,
            static_weight: 0.6,
            local_deadline_base: Duration::from_secs(30),
            local_deadline_per_page: Duration::from_secs(20),
            cloud_deadline_base: Duration::from_secs(60),
            cloud_deadline_per_page: Duration::from_secs(30),
            deadline_grace: Duration::from_secs(5),
            default_languages: vec!["eng".to_owned()],
            work_root: std::env::temp_dir().join("nvisy"),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default() {
        let built = EngineConfig::builder().build().unwrap();
        let default = EngineConfig::default();
        assert_eq!(built.max_attempts, default.max_attempts);
        assert_eq!(built.chunk_pages, default.chunk_pages);
        assert_eq!(built.thresholds, default.thresholds);
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(EngineConfig::builder().max_attempts(0u32).build().is_err());
        assert!(EngineConfig::builder().ema_alpha(0.0f32).build().is_err());
    }

    #[test]
    fn cloud_deadline_exceeds_local() {
        let config = EngineConfig::default();
        let local = config.attempt_timeout(ProviderClass::Local, 5);
        let cloud = config.attempt_timeout(ProviderClass::Cloud, 5);
        assert_eq!(local, Duration::from_secs(130));
        assert!(cloud > local);
    }
}
