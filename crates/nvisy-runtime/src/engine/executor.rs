//! Single attempt execution.

use std::sync::Arc;

use jiff::Timestamp;
use nvisy_core::event::{EventKind, SharedSink, TaskEvent};
use nvisy_core::provider::{ProviderClass, ProviderError, ProviderResult, RecognizeRequest};
use nvisy_core::quality::QualityScore;
use nvisy_provider::ProviderRegistry;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::EngineConfig;
use super::queue::AttemptSpec;
use crate::quality::QualityEvaluator;

/// Tracing target for attempt execution.
const TRACING_TARGET: &str = "nvisy_runtime::engine::executor";

/// What an attempt produced.
#[derive(Debug)]
pub(crate) enum AttemptOutput {
    Scored {
        result: ProviderResult,
        quality: QualityScore,
        accepted: bool,
    },
    Failed(ProviderError),
}

/// A finished attempt, reported back to the coordinator.
#[derive(Debug)]
pub(crate) struct FinishedAttempt {
    pub spec: AttemptSpec,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub output: AttemptOutput,
}

/// Runs attempts against the registered providers.
///
/// Each call gets its own working directory, removed once the provider
/// returns, and a deadline derived from the chunk size and provider class.
/// Calls to cloud providers additionally hold a permit of a shared
/// semaphore.
pub(crate) struct AttemptExecutor {
    registry: Arc<ProviderRegistry>,
    evaluator: QualityEvaluator,
    cloud_permits: Arc<Semaphore>,
    events: SharedSink,
    config: EngineConfig,
}

impl AttemptExecutor {
    pub fn new(config: &EngineConfig, registry: Arc<ProviderRegistry>, events: SharedSink) -> Self {
        Self {
            registry,
            evaluator: QualityEvaluator::new(config),
            cloud_permits: Arc::new(Semaphore::new(config.cloud_concurrency)),
            events,
            config: config.clone(),
        }
    }

    /// Runs one attempt. Provider failures are part of the returned report.
    #[tracing::instrument(
        target = TRACING_TARGET,
        skip_all,
        fields(
            task_id = %spec.task_id,
            chunk_id = %spec.chunk_id,
            attempt = spec.sequence,
            provider = %spec.strategy.provider,
        )
    )]
    pub async fn run(&self, spec: AttemptSpec) -> FinishedAttempt {
        self.events
            .emit(
                TaskEvent::new(spec.task_id, EventKind::AttemptStarted)
                    .with_chunk(spec.chunk_id)
                    .with_attempt(spec.sequence)
                    .with_provider(spec.strategy.provider.clone()),
            )
            .await;

        let started_at = Timestamp::now();
        let clock = Instant::now();
        let output = match self.call(&spec).await {
            Ok(result) => {
                let mut result = result.offset_pages(spec.pages.start);
                result.metadata.elapsed_ms = clock.elapsed().as_millis() as u64;
                let quality = self.evaluator.evaluate(&result, &spec.content_types);
                let accepted = self.evaluator.accepts(&quality, &spec.content_types);
                tracing::debug!(
                    target: TRACING_TARGET,
                    overall = quality.overall,
                    accepted,
                    elements = result.elements.len(),
                    "attempt scored"
                );
                AttemptOutput::Scored {
                    result,
                    quality,
                    accepted,
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    kind = %error.kind,
                    error = %error,
                    "attempt failed"
                );
                AttemptOutput::Failed(error)
            }
        };

        let mut event = TaskEvent::new(spec.task_id, EventKind::AttemptFinished)
            .with_chunk(spec.chunk_id)
            .with_attempt(spec.sequence)
            .with_provider(spec.strategy.provider.clone());
        event = match &output {
            AttemptOutput::Scored { quality, .. } => event.with_quality(quality.clone()),
            AttemptOutput::Failed(error) => event.with_detail(error.to_string()),
        };
        self.events.emit(event).await;

        FinishedAttempt {
            spec,
            started_at,
            finished_at: Timestamp::now(),
            output,
        }
    }

    async fn call(&self, spec: &AttemptSpec) -> Result<ProviderResult, ProviderError> {
        let provider = self
            .registry
            .get(&spec.strategy.provider)
            .ok_or_else(|| ProviderError::configuration(format!("provider {} is not registered", spec.strategy.provider)))?;
        let class = provider.descriptor().class;

        let _permit = match class {
            ProviderClass::Cloud => Some(
                self.cloud_permits
                    .acquire()
                    .await
                    .map_err(|err| ProviderError::transient("cloud limiter closed").with_source(err))?,
            ),
            ProviderClass::Local => None,
        };

        let work_dir = self.work_dir()?;
        let allowed = self.config.attempt_timeout(class, spec.pages.len());
        let deadline = Instant::now() + allowed;
        let request = RecognizeRequest {
            chunk: spec.payload.clone(),
            format: spec.format,
            pages: spec.pages,
            content_types: spec.content_types.clone(),
            configuration: spec.strategy.configuration.clone(),
            deadline,
            work_dir: work_dir.path().to_path_buf(),
        };

        let hard_stop = deadline + self.config.deadline_grace;
        let outcome = match tokio::time::timeout_at(hard_stop, provider.recognize(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    allowed_ms = allowed.as_millis() as u64,
                    "provider ignored its deadline, call abandoned"
                );
                Err(ProviderError::deadline_exceeded(allowed))
            }
        };

        if let Err(err) = work_dir.close() {
            tracing::debug!(target: TRACING_TARGET, error = %err, "failed to remove work dir");
        }
        outcome
    }

    fn work_dir(&self) -> Result<tempfile::TempDir, ProviderError> {
        tempfile::Builder::new()
            .prefix("attempt-")
            .tempdir_in(&self.config.work_root)
            .map_err(|err| {
                ProviderError::transient(format!(
                    "cannot create work dir under {}",
                    self.config.work_root.display()
                ))
                .with_source(err)
            })
    }

    /// Deadline the executor would grant a call, without the grace period.
    #[cfg(test)]
    pub fn allowance(&self, class: ProviderClass, pages: u32) -> std::time::Duration {
        self.config.attempt_timeout(class, pages)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use bytes::Bytes;
    use nvisy_core::content::ContentTypes;
    use nvisy_core::document::{DocumentFormat, PageRange};
    use nvisy_core::event::NoopSink;
    use nvisy_core::mock::{Scripted, ScriptedProvider, fixtures};
    use nvisy_core::provider::{Configuration, ProviderErrorKind, ProviderRole};
    use nvisy_core::{ChunkId, TaskId};

    use super::*;
    use crate::selector::Strategy;

    fn executor(provider: ScriptedProvider, work_root: PathBuf) -> AttemptExecutor {
        let config = EngineConfig::builder()
            .work_root(work_root)
            .local_deadline_base(Duration::from_secs(1))
            .local_deadline_per_page(Duration::from_secs(1))
            .cloud_deadline_base(Duration::from_secs(2))
            .cloud_deadline_per_page(Duration::from_secs(1))
            .deadline_grace(Duration::from_millis(100))
            .build()
            .unwrap();
        let registry = ProviderRegistry::new().with(provider).unwrap();
        AttemptExecutor::new(&config, Arc::new(registry), Arc::new(NoopSink))
    }

    fn spec(provider: &str, pages: PageRange) -> AttemptSpec {
        AttemptSpec {
            task_id: TaskId::new(),
            chunk_id: ChunkId::new(1),
            sequence: 1,
            pages,
            strategy: Strategy::new(0, provider, Configuration::generic()),
            content_types: ContentTypes::text(),
            format: DocumentFormat::Pdf,
            payload: Bytes::from_static(b"%PDF-1.7"),
        }
    }

    #[tokio::test]
    async fn scores_result_on_absolute_pages() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(ScriptedProvider::local_descriptor("stub"), |request, _| {
            assert!(request.work_dir.is_dir());
            Scripted::Elements(fixtures::text_pages(request.pages.len(), 0.0))
        });
        let executor = executor(provider, dir.path().to_path_buf());

        let finished = executor.run(spec("stub", PageRange::new(5, 7))).await;
        let AttemptOutput::Scored { result, accepted, .. } = finished.output else {
            panic!("expected a scored attempt");
        };
        assert!(accepted);
        let pages: Vec<u32> = result.elements.iter().map(|e| e.page()).collect();
        assert_eq!(pages, [5, 6]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_provider_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::sequence(ScriptedProvider::local_descriptor("stub"), Vec::new());
        let executor = executor(provider, dir.path().to_path_buf());
        let finished = executor.run(spec("missing", PageRange::new(0, 1))).await;
        assert!(matches!(
            finished.output,
            AttemptOutput::Failed(ref error) if error.kind == ProviderErrorKind::Configuration
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_times_out_as_transient() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::sequence(
            ScriptedProvider::cloud_descriptor("slow", ProviderRole::DocumentStructure, 0.01),
            vec![Scripted::Hang],
        );
        let executor = executor(provider, dir.path().to_path_buf());
        assert_eq!(executor.allowance(ProviderClass::Cloud, 1), Duration::from_secs(3));

        let finished = executor.run(spec("slow", PageRange::new(0, 1))).await;
        assert!(matches!(
            finished.output,
            AttemptOutput::Failed(ref error) if error.kind == ProviderErrorKind::Transient
        ));
    }
}
