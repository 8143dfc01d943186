use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use lopdf::Object;
use lopdf::content::Content;
use nvisy_core::content::{ContentElement, ContentType, ContentTypes, Position, TextSpan, Word};
use nvisy_core::document::PageRange;
use nvisy_core::event::{BroadcastSink, EventKind, NoopSink, SharedSink, TaskEvent};
use nvisy_core::mock::{Scripted, ScriptedProvider, fixtures};
use nvisy_core::provider::{ProviderId, ProviderRole};
use nvisy_core::store::{MemoryStore, SharedStore};
use nvisy_provider::ProviderRegistry;
use tempfile::TempDir;

use super::{EngineConfig, TaskManager};
use crate::RuntimeError;
use crate::task::{SubmitRequest, TaskStatus};
use crate::testing::{Page, pdf, scanned_pdf};
use crate::workflow::ChunkState;

fn config(dir: &TempDir, chunk_pages: u32, concurrency: usize) -> EngineConfig {
    EngineConfig::builder()
        .work_root(dir.path().to_path_buf())
        .chunk_pages(chunk_pages)
        .concurrency(concurrency)
        .backoff_initial(Duration::from_millis(10))
        .build()
        .unwrap()
}

async fn start(
    config: EngineConfig,
    providers: Vec<ScriptedProvider>,
    store: Arc<MemoryStore>,
    events: SharedSink,
) -> TaskManager {
    let registry = providers
        .into_iter()
        .try_fold(ProviderRegistry::new(), |registry, provider| registry.with(provider))
        .unwrap();
    TaskManager::start(config, registry, store as SharedStore, events)
        .await
        .unwrap()
}

fn clean_text(id: &str) -> ScriptedProvider {
    ScriptedProvider::new(ScriptedProvider::local_descriptor(id), |request, _| {
        Scripted::Elements(fixtures::text_pages(request.pages.len(), 0.0))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scanned_document_is_chunked_and_merged() {
    let dir = tempfile::tempdir().unwrap();
    let provider = clean_text("local");
    let calls = provider.call_counter();
    let manager = start(
        config(&dir, 5, 2),
        vec![provider],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(scanned_pdf(12), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    let task = manager.wait(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.chunks.len(), 3);
    assert!(task.chunks.iter().all(|chunk| chunk.state == ChunkState::Accepted));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let result = manager.result(task_id).await.unwrap().unwrap();
    let pages: Vec<u32> = result.elements.iter().map(|e| e.element.page()).collect();
    assert_eq!(pages, (0..12).collect::<Vec<_>>());
    assert_eq!(result.chunks.len(), 3);
    assert!(!result.low_confidence);
    assert!((result.quality.overall - 1.0).abs() < 1e-6);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn weak_schematic_escalates_to_next_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let vision = ScriptedProvider::sequence(
        ScriptedProvider::cloud_descriptor("vision", ProviderRole::ImageUnderstanding, 0.02),
        vec![Scripted::Elements(vec![fixtures::schematic(0, 1, 2)])],
    );
    let local = ScriptedProvider::sequence(
        ScriptedProvider::local_descriptor("local"),
        vec![Scripted::Elements(vec![fixtures::schematic(0, 7, 10)])],
    );
    let manager = start(
        config(&dir, 5, 2),
        vec![vision, local],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let request = SubmitRequest::new(ContentTypes::new().with(ContentType::Schematics));
    let task_id = manager.submit(scanned_pdf(1), request).await.unwrap();
    let task = manager.wait(task_id).await.unwrap();

    let chunk = &task.chunks[0];
    assert_eq!(chunk.state, ChunkState::Accepted);
    assert_eq!(chunk.attempts.len(), 2);
    assert_eq!(chunk.attempts[0].strategy.provider, ProviderId::from("vision"));
    assert_eq!(chunk.attempts[1].strategy.provider, ProviderId::from("local"));

    let result = manager.result(task_id).await.unwrap().unwrap();
    assert!((result.quality.overall - 0.7).abs() < 1e-3);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_chunk_keeps_best_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let noisy = |id: &str, role| {
        ScriptedProvider::sequence(
            ScriptedProvider::cloud_descriptor(id, role, 0.01),
            vec![Scripted::Elements(fixtures::text_pages(1, 1.0))],
        )
    };
    let manager = start(
        config(&dir, 5, 1),
        vec![
            noisy("structure", ProviderRole::DocumentStructure),
            noisy("vision", ProviderRole::ImageUnderstanding),
        ],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(scanned_pdf(1), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    let task = manager.wait(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.chunks[0].state, ChunkState::Exhausted);
    assert_eq!(task.chunks[0].attempts.len(), 2);
    assert!(task.is_low_confidence());

    let result = manager.result(task_id).await.unwrap().unwrap();
    assert!(result.low_confidence);
    assert_eq!(result.elements.len(), 1);
    assert!((result.quality.overall - 0.6).abs() < 1e-3);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn merge_restores_page_order_and_takes_weakest_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(ScriptedProvider::local_descriptor("local"), |request, _| {
        let ratio = if request.pages.start == 2 { 0.25 } else { 0.0 };
        Scripted::Elements(fixtures::text_pages(request.pages.len(), ratio))
    });
    let manager = start(
        config(&dir, 2, 3),
        vec![provider],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(scanned_pdf(6), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    manager.wait(task_id).await.unwrap();

    let result = manager.result(task_id).await.unwrap().unwrap();
    let pages: Vec<u32> = result.elements.iter().map(|e| e.element.page()).collect();
    assert_eq!(pages, [0, 1, 2, 3, 4, 5]);
    assert!((result.quality.overall - 0.9).abs() < 1e-3);
    assert!(!result.low_confidence);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_document_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let manager = start(
        config(&dir, 5, 1),
        vec![clean_text("local")],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(Bytes::from_static(b"%PDF-1.7 truncated"), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!task.diagnostics.is_empty());
    assert!(manager.result(task_id).await.unwrap().is_none());

    let rejected = manager
        .submit(scanned_pdf(1), SubmitRequest::new(ContentTypes::new()))
        .await;
    assert!(matches!(rejected, Err(RuntimeError::InvalidRequest(_))));
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_task_dispatches_nothing_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = clean_text("local").with_latency(Duration::from_millis(50));
    let calls = provider.call_counter();
    let manager = start(
        config(&dir, 1, 1),
        vec![provider],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(scanned_pdf(4), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    manager.pause(task_id).await.unwrap();
    assert_eq!(manager.get_status(task_id).await.unwrap().status, TaskStatus::Paused);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(calls.load(Ordering::SeqCst) <= 1);
    assert_eq!(manager.get_status(task_id).await.unwrap().status, TaskStatus::Paused);

    manager.resume(task_id).await.unwrap();
    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    assert!(matches!(
        manager.pause(task_id).await,
        Err(RuntimeError::InvalidState { .. })
    ));
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_task_has_no_result() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::sequence(ScriptedProvider::local_descriptor("local"), vec![Scripted::Hang]);
    let manager = start(
        config(&dir, 5, 1),
        vec![provider],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;

    let task_id = manager
        .submit(scanned_pdf(10), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    manager.cancel(task_id).await.unwrap();

    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.chunks.iter().all(|chunk| chunk.state == ChunkState::Cancelled));
    assert!(manager.result(task_id).await.unwrap().is_none());
    assert!(matches!(
        manager.cancel(task_id).await,
        Err(RuntimeError::InvalidState { .. })
    ));
    assert!(matches!(
        manager.get_status(nvisy_core::TaskId::new()).await,
        Err(RuntimeError::TaskNotFound(_))
    ));
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_skips_checkpointed_chunks() {
    let hang = Arc::new(AtomicBool::new(true));
    let provider = ScriptedProvider::new(ScriptedProvider::local_descriptor("local"), {
        let hang = hang.clone();
        move |request, _| {
            if request.pages.start == 10 && hang.load(Ordering::SeqCst) {
                Scripted::Hang
            } else {
                Scripted::Elements(fixtures::text_pages(request.pages.len(), 0.1))
            }
        }
    });
    let calls = provider.call_counter();
    let bytes = scanned_pdf(12);
    let store = Arc::new(MemoryStore::new());

    // First run: chunks 0 and 1 finish, chunk 2 hangs until shutdown.
    let dir = tempfile::tempdir().unwrap();
    let sink = BroadcastSink::new(256);
    let mut events = sink.subscribe();
    let manager = start(config(&dir, 5, 2), vec![provider.clone()], store.clone(), Arc::new(sink)).await;
    let task_id = manager
        .submit(bytes.clone(), SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();

    checkpointed(&mut events, 2).await;
    manager.shutdown().await;

    // Second run on the same store.
    hang.store(false, Ordering::SeqCst);
    let before = calls.load(Ordering::SeqCst);
    let manager = start(config(&dir, 5, 2), vec![provider.clone()], store.clone(), Arc::new(NoopSink)).await;
    assert_eq!(manager.recover().await.unwrap(), [task_id]);
    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst) - before, 1);
    let resumed = manager.result(task_id).await.unwrap().unwrap();
    assert!(manager.recover().await.unwrap().is_empty());
    manager.shutdown().await;

    // Reference run without interruption.
    let manager = start(
        config(&dir, 5, 2),
        vec![provider],
        Arc::new(MemoryStore::new()),
        Arc::new(NoopSink),
    )
    .await;
    let reference_id = manager
        .submit(bytes, SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    manager.wait(reference_id).await.unwrap();
    let reference = manager.result(reference_id).await.unwrap().unwrap();
    manager.shutdown().await;

    let elements = |result: &crate::merge::MergedResult| {
        result.elements.iter().map(|e| e.element.clone()).collect::<Vec<_>>()
    };
    let provenance = |result: &crate::merge::MergedResult| {
        result.elements.iter().map(|e| e.provenance.clone()).collect::<Vec<_>>()
    };
    assert_eq!(elements(&resumed), elements(&reference));
    assert_eq!(provenance(&resumed), provenance(&reference));
    assert_eq!(resumed.quality, reference.quality);
}

/// Waits until `chunks` chunks are accepted and covered by a checkpoint.
async fn checkpointed(events: &mut tokio::sync::broadcast::Receiver<TaskEvent>, chunks: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut accepted = 0;
        loop {
            let event = events.recv().await.unwrap();
            match event.kind {
                EventKind::ChunkAccepted => accepted += 1,
                EventKind::CheckpointWritten if accepted == chunks => break,
                _ => {}
            }
        }
    })
    .await
    .unwrap();
}

const LABELS: [&str; 12] = [
    "p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9", "p10", "p11",
];

/// The label drawn on each page of a chunk payload.
fn page_labels(chunk: &Bytes) -> Vec<String> {
    let pdf = lopdf::Document::load_mem(chunk).unwrap();
    pdf.get_pages()
        .values()
        .map(|&page_id| {
            let content = Content::decode(&pdf.get_page_content(page_id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| match op.operands.first() {
                    Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

/// One span per payload page, led by the page label.
fn labelled_spans(chunk: &Bytes) -> Vec<ContentElement> {
    page_labels(chunk)
        .into_iter()
        .enumerate()
        .map(|(page, label)| {
            let mut words = vec![Word::new(label, fixtures::HIGH_CONFIDENCE)];
            words.extend((0..fixtures::WORDS_PER_SPAN).map(|_| Word::new("document", fixtures::HIGH_CONFIDENCE)));
            ContentElement::Text(TextSpan::from_words(Position::new(page as u32, 0), words))
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_keeps_stored_chunk_ranges() {
    let hang = Arc::new(AtomicBool::new(true));
    let provider = ScriptedProvider::new(ScriptedProvider::local_descriptor("local"), {
        let hang = hang.clone();
        move |request, _| {
            if request.pages.start == 10 && hang.load(Ordering::SeqCst) {
                Scripted::Hang
            } else {
                Scripted::Elements(labelled_spans(&request.chunk))
            }
        }
    });
    let pages: Vec<Page> = LABELS.iter().map(|&label| Page::Text(label)).collect();
    let bytes = pdf(&pages);
    let store = Arc::new(MemoryStore::new());

    let dir = tempfile::tempdir().unwrap();
    let sink = BroadcastSink::new(256);
    let mut events = sink.subscribe();
    let manager = start(config(&dir, 5, 2), vec![provider.clone()], store.clone(), Arc::new(sink)).await;
    let task_id = manager
        .submit(bytes, SubmitRequest::new(ContentTypes::text()))
        .await
        .unwrap();
    checkpointed(&mut events, 2).await;
    manager.shutdown().await;

    // Resume with a different chunk size.
    hang.store(false, Ordering::SeqCst);
    let manager = start(config(&dir, 2, 2), vec![provider], store.clone(), Arc::new(NoopSink)).await;
    assert_eq!(manager.recover().await.unwrap(), [task_id]);
    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let ranges: Vec<PageRange> = task.chunks.iter().map(|chunk| chunk.pages).collect();
    assert_eq!(ranges, [PageRange::new(0, 5), PageRange::new(5, 10), PageRange::new(10, 12)]);

    let result = manager.result(task_id).await.unwrap().unwrap();
    manager.shutdown().await;
    assert_eq!(result.elements.len(), LABELS.len());
    for merged in &result.elements {
        let ContentElement::Text(span) = &merged.element else {
            panic!("unexpected element {:?}", merged.element);
        };
        let label = LABELS[span.position.page as usize];
        assert_eq!(span.text.split_whitespace().next(), Some(label));
    }
}
