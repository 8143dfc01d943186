//! Chunk planning.

use nvisy_core::document::{Document, PageRange};
use nvisy_core::{ChunkId, TaskId};

use crate::task::Chunk;

/// Splits a document into contiguous page ranges.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    chunk_pages: u32,
}

impl ChunkPlanner {
    /// Creates a planner cutting at most `chunk_pages` pages per chunk.
    pub fn new(chunk_pages: u32) -> Self {
        Self {
            chunk_pages: chunk_pages.max(1),
        }
    }

    /// Returns the page ranges covering `page_count` pages in order.
    pub fn ranges(&self, page_count: u32) -> Vec<PageRange> {
        (0..page_count)
            .step_by(self.chunk_pages as usize)
            .map(|start| PageRange::new(start, (start + self.chunk_pages).min(page_count)))
            .collect()
    }

    /// Plans the chunks of `document`. The ranges are disjoint and their
    /// union is the whole document.
    pub fn plan(&self, task_id: TaskId, document: &Document) -> Vec<Chunk> {
        self.ranges(document.page_count)
            .into_iter()
            .enumerate()
            .map(|(index, pages)| Chunk::new(task_id, ChunkId::new(index as u32), pages))
            .collect()
    }
}
