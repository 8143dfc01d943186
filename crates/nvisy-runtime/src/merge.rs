//! Result merging.
//!
//! Chunks finish in any order. The merger takes the best result of every
//! terminal chunk, restores page order, and joins tables and schematics that
//! continue across a chunk boundary.

use jiff::Timestamp;
use nvisy_core::content::{ContentElement, Schematic, Table};
use nvisy_core::document::{DocumentId, PageRange};
use nvisy_core::provider::{ProviderId, ProviderResult};
use nvisy_core::quality::QualityScore;
use nvisy_core::{ChunkId, TaskId};
use serde::{Deserialize, Serialize};

use crate::task::{AttemptOutcome, Chunk, Task};
use crate::workflow::ChunkState;

/// Tracing target for result merging.
pub const TRACING_TARGET: &str = "nvisy_runtime::merge";

/// Where a merged element came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub chunk: ChunkId,
    /// Sequence of the attempt within its chunk.
    pub attempt: u32,
    pub provider: ProviderId,
}

/// An element of the merged output with its sources. Elements stitched
/// across chunks carry one provenance entry per contributing chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedElement {
    pub element: ContentElement,
    pub provenance: Vec<Provenance>,
}

/// Per-chunk line of the merged output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk: ChunkId,
    pub pages: PageRange,
    pub state: ChunkState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    pub low_confidence: bool,
}

/// Final output of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub task_id: TaskId,
    pub document_id: DocumentId,
    /// Elements in page order.
    pub elements: Vec<MergedElement>,
    /// Minimum over the scores of the merged chunks.
    pub quality: QualityScore,
    /// At least one chunk fell short of its threshold, or no provider
    /// suited the document.
    pub low_confidence: bool,
    pub chunks: Vec<ChunkSummary>,
    pub merged_at: Timestamp,
}

impl MergedResult {
    /// Store key of the final result of a task.
    pub fn storage_key(task_id: TaskId) -> String {
        format!("results/{task_id}/final")
    }
}

/// The result one chunk contributes to the merge.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk: ChunkId,
    pub pages: PageRange,
    pub attempt: u32,
    /// Rank of the strategy that produced the result.
    pub rank: u32,
    pub accepted: bool,
    pub result: ProviderResult,
    pub quality: QualityScore,
}

impl ChunkResult {
    /// The best attempt of a terminal chunk, if it produced output.
    pub fn from_chunk(chunk: &Chunk) -> Option<Self> {
        let attempt = chunk.best_attempt()?;
        Some(Self {
            chunk: chunk.id,
            pages: chunk.pages,
            attempt: attempt.sequence,
            rank: attempt.strategy.rank,
            accepted: attempt.outcome == AttemptOutcome::Accepted,
            result: attempt.result.clone()?,
            quality: attempt.quality.clone().unwrap_or_default(),
        })
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.pages.start < other.pages.end && other.pages.start < self.pages.end
    }
}

/// Merges the chunks of a finished task.
pub fn merge(task: &Task) -> MergedResult {
    let inputs = task.chunks.iter().filter_map(ChunkResult::from_chunk);
    let (elements, quality) = merge_chunks(inputs);

    let chunks = task
        .chunks
        .iter()
        .map(|chunk| {
            let best = chunk.best_attempt();
            ChunkSummary {
                chunk: chunk.id,
                pages: chunk.pages,
                state: chunk.state,
                attempts: chunk.attempts.len() as u32,
                provider: best.map(|attempt| attempt.strategy.provider.clone()),
                quality: best.map(|attempt| attempt.overall()),
                low_confidence: chunk.is_low_confidence(),
            }
        })
        .collect();

    tracing::debug!(
        target: TRACING_TARGET,
        task_id = %task.id,
        elements = elements.len(),
        quality = quality.overall,
        "chunks merged"
    );

    MergedResult {
        task_id: task.id,
        document_id: task.document_id.clone(),
        elements,
        quality,
        low_confidence: task.is_low_confidence(),
        chunks,
        merged_at: Timestamp::now(),
    }
}

/// Merges chunk results given in any order.
///
/// Results whose page ranges overlap are resolved in favor of the higher
/// overall score; equal scores keep the lower strategy rank. The returned
/// score is the minimum over the kept results.
pub fn merge_chunks(inputs: impl IntoIterator<Item = ChunkResult>) -> (Vec<MergedElement>, QualityScore) {
    let mut candidates: Vec<ChunkResult> = inputs.into_iter().collect();
    candidates.sort_by(|a, b| {
        b.quality
            .overall
            .total_cmp(&a.quality.overall)
            .then_with(|| a.rank.cmp(&b.rank))
            .then_with(|| a.chunk.cmp(&b.chunk))
    });

    let mut kept: Vec<ChunkResult> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().any(|existing| existing.overlaps(&candidate)) {
            tracing::debug!(
                target: TRACING_TARGET,
                chunk_id = %candidate.chunk,
                pages = %candidate.pages,
                "overlapping result dropped"
            );
            continue;
        }
        kept.push(candidate);
    }

    let quality = QualityScore::aggregate(kept.iter().map(|input| &input.quality));

    let mut positioned: Vec<(ChunkId, MergedElement)> = kept
        .into_iter()
        .flat_map(|input| {
            let provenance = Provenance {
                chunk: input.chunk,
                attempt: input.attempt,
                provider: input.result.metadata.provider.clone(),
            };
            input.result.elements.into_iter().map(move |element| {
                (
                    input.chunk,
                    MergedElement {
                        element,
                        provenance: vec![provenance.clone()],
                    },
                )
            })
        })
        .collect();
    positioned.sort_by_key(|(chunk, merged)| {
        let position = merged.element.position();
        (position.page, *chunk, position.order)
    });

    let mut elements: Vec<MergedElement> = Vec::with_capacity(positioned.len());
    let mut last_chunk: Option<ChunkId> = None;
    for (chunk, merged) in positioned {
        let crosses_boundary = last_chunk.is_some_and(|previous| previous != chunk);
        let page = merged.element.page();
        let stitched = match elements.last_mut() {
            Some(previous) if crosses_boundary && previous.element.page() + 1 == page => {
                stitch(previous, &merged)
            }
            _ => false,
        };
        if !stitched {
            elements.push(merged);
        }
        last_chunk = Some(chunk);
    }

    (elements, quality)
}

/// Appends `next` to `previous` if it continues it.
fn stitch(previous: &mut MergedElement, next: &MergedElement) -> bool {
    let joined = match (&mut previous.element, &next.element) {
        (ContentElement::Table(head), ContentElement::Table(tail)) => stitch_table(head, tail),
        (ContentElement::Schematic(head), ContentElement::Schematic(tail)) => stitch_schematic(head, tail),
        _ => false,
    };
    if joined {
        previous.provenance.extend(next.provenance.iter().cloned());
    }
    joined
}

fn stitch_table(head: &mut Table, tail: &Table) -> bool {
    if head.column_count() != tail.column_count() || tail.rows.is_empty() {
        return false;
    }
    // A repeated header row is dropped.
    let skip = usize::from(head.rows.first() == tail.rows.first());
    head.rows.extend(tail.rows.iter().skip(skip).cloned());
    true
}

fn stitch_schematic(head: &mut Schematic, tail: &Schematic) -> bool {
    let continues = tail
        .off_page_refs
        .iter()
        .any(|reference| head.off_page_refs.contains(reference));
    if !continues {
        return false;
    }
    for symbol in &tail.symbols {
        if !head.symbols.iter().any(|existing| existing.id == symbol.id) {
            head.symbols.push(symbol.clone());
        }
    }
    head.connections.extend(tail.connections.iter().cloned());
    for reference in &tail.off_page_refs {
        if !head.off_page_refs.contains(reference) {
            head.off_page_refs.push(reference.clone());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::{Position, SchematicSymbol, TableCell, TextSpan};
    use nvisy_core::mock::fixtures;

    use super::*;

    fn input(chunk: u32, pages: PageRange, elements: Vec<ContentElement>, overall: f32) -> ChunkResult {
        ChunkResult {
            chunk: ChunkId::new(chunk),
            pages,
            attempt: 1,
            rank: 0,
            accepted: true,
            result: ProviderResult::new(ProviderId::from("stub"), elements),
            quality: QualityScore {
                overall,
                ..Default::default()
            },
        }
    }

    fn text(page: u32, order: u32) -> ContentElement {
        ContentElement::Text(TextSpan::plain(Position::new(page, order), format!("p{page}"), Some(0.9)))
    }

    fn table(page: u32, order: u32, rows: &[&[&str]]) -> ContentElement {
        ContentElement::Table(Table {
            position: Position::new(page, order),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| TableCell::new(*cell)).collect())
                .collect(),
        })
    }

    #[test]
    fn restores_page_order_regardless_of_input_order() {
        let inputs = vec![
            input(2, PageRange::new(10, 12), vec![text(11, 0), text(10, 0)], 0.9),
            input(0, PageRange::new(0, 5), vec![text(4, 1), text(0, 0), text(4, 0)], 0.95),
            input(1, PageRange::new(5, 10), vec![text(5, 0)], 0.4),
        ];
        let (elements, quality) = merge_chunks(inputs);
        let pages: Vec<(u32, u32)> = elements
            .iter()
            .map(|merged| (merged.element.page(), merged.element.position().order))
            .collect();
        assert_eq!(pages, [(0, 0), (4, 0), (4, 1), (5, 0), (10, 0), (11, 0)]);
        assert!((quality.overall - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn overlapping_results_prefer_higher_score_then_rank() {
        let low = input(0, PageRange::new(0, 2), vec![text(0, 0)], 0.5);
        let mut high = input(1, PageRange::new(1, 3), vec![text(1, 0)], 0.8);
        high.rank = 1;
        let (elements, quality) = merge_chunks([low, high]);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].provenance[0].chunk, ChunkId::new(1));
        assert_eq!(quality.overall, 0.8);

        let mut first = input(0, PageRange::new(0, 2), vec![text(0, 0)], 0.7);
        first.rank = 1;
        let second = input(1, PageRange::new(0, 2), vec![text(0, 1)], 0.7);
        let (elements, _) = merge_chunks([first, second]);
        assert_eq!(elements[0].provenance[0].chunk, ChunkId::new(1));
    }

    #[test]
    fn stitches_table_across_chunk_boundary() {
        let head = input(
            0,
            PageRange::new(0, 5),
            vec![text(4, 0), table(4, 1, &[&["a", "b"], &["1", "2"]])],
            0.9,
        );
        let tail = input(
            1,
            PageRange::new(5, 10),
            vec![table(5, 0, &[&["a", "b"], &["3", "4"]]), text(5, 1)],
            0.9,
        );
        let (elements, _) = merge_chunks([tail, head]);
        assert_eq!(elements.len(), 3);
        let ContentElement::Table(table) = &elements[1].element else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), 3);
        assert_eq!(elements[1].provenance.len(), 2);
    }

    #[test]
    fn tables_with_different_columns_stay_apart() {
        let head = input(0, PageRange::new(0, 1), vec![table(0, 0, &[&["a", "b"]])], 0.9);
        let tail = input(1, PageRange::new(1, 2), vec![table(1, 0, &[&["a", "b", "c"]])], 0.9);
        let (elements, _) = merge_chunks([head, tail]);
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn stitches_schematic_sharing_off_page_reference() {
        let sheet = |page: u32, symbol: &str| {
            ContentElement::Schematic(Schematic {
                position: Position::new(page, 0),
                symbols: vec![SchematicSymbol {
                    id: symbol.to_owned(),
                    label: symbol.to_owned(),
                    confidence: 0.9,
                }],
                connections: Vec::new(),
                off_page_refs: vec!["A1".to_owned()],
            })
        };
        let head = input(0, PageRange::new(0, 1), vec![sheet(0, "R1")], 0.9);
        let tail = input(1, PageRange::new(1, 2), vec![sheet(1, "C1")], 0.9);
        let (elements, _) = merge_chunks([head, tail]);
        assert_eq!(elements.len(), 1);
        let ContentElement::Schematic(schematic) = &elements[0].element else {
            panic!("expected a schematic");
        };
        assert_eq!(schematic.symbols.len(), 2);
    }

    #[test]
    fn text_within_chunk_is_not_stitched() {
        let single = input(0, PageRange::new(0, 2), fixtures::text_pages(2, 0.0), 0.9);
        let (elements, _) = merge_chunks([single]);
        assert_eq!(elements.len(), fixtures::text_pages(2, 0.0).len());
    }
}
