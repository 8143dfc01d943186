//! Priority queue of ready chunk attempts.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;
use nvisy_core::content::ContentTypes;
use nvisy_core::document::{DocumentFormat, PageRange};
use nvisy_core::{ChunkId, TaskId};
use tokio::sync::{Mutex, Notify};

use crate::selector::Strategy;

/// Everything a worker needs to run one attempt.
#[derive(Debug, Clone)]
pub(crate) struct AttemptSpec {
    pub task_id: TaskId,
    pub chunk_id: ChunkId,
    /// Sequence the attempt will be recorded under.
    pub sequence: u32,
    pub pages: PageRange,
    pub strategy: Strategy,
    pub content_types: ContentTypes,
    pub format: DocumentFormat,
    pub payload: Bytes,
}

/// A queued attempt. Higher priorities run first, then FIFO.
#[derive(Debug)]
pub(crate) struct WorkItem {
    pub priority: i32,
    order: u64,
    pub attempt: AttemptSpec,
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug, Default)]
struct Heap {
    items: BinaryHeap<WorkItem>,
    next_order: u64,
}

/// Shared queue between the coordinator and the workers.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    heap: Mutex<Heap>,
    ready: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, priority: i32, attempt: AttemptSpec) {
        let mut heap = self.heap.lock().await;
        let order = heap.next_order;
        heap.next_order += 1;
        heap.items.push(WorkItem {
            priority,
            order,
            attempt,
        });
        drop(heap);
        self.ready.notify_one();
    }

    /// Waits for the next item.
    pub async fn pop(&self) -> WorkItem {
        loop {
            let ready = self.ready.notified();
            if let Some(item) = self.heap.lock().await.items.pop() {
                return item;
            }
            ready.await;
        }
    }

    /// Removes every queued item of `task_id` and returns their chunks.
    pub async fn remove_task(&self, task_id: TaskId) -> Vec<ChunkId> {
        let mut heap = self.heap.lock().await;
        let mut removed = Vec::new();
        let kept: BinaryHeap<WorkItem> = std::mem::take(&mut heap.items)
            .into_iter()
            .filter(|item| {
                let matches = item.attempt.task_id == task_id;
                if matches {
                    removed.push(item.attempt.chunk_id);
                }
                !matches
            })
            .collect();
        heap.items = kept;
        removed
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.items.len()
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::provider::Configuration;

    use super::*;

    fn spec(task_id: TaskId, chunk: u32) -> AttemptSpec {
        AttemptSpec {
            task_id,
            chunk_id: ChunkId::new(chunk),
            sequence: 1,
            pages: PageRange::new(chunk, chunk + 1),
            strategy: Strategy::new(0, "stub", Configuration::generic()),
            content_types: ContentTypes::text(),
            format: DocumentFormat::Pdf,
            payload: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn higher_priority_first_then_fifo() {
        let queue = WorkQueue::new();
        let low = TaskId::new();
        let high = TaskId::new();
        queue.push(0, spec(low, 0)).await;
        queue.push(0, spec(low, 1)).await;
        queue.push(5, spec(high, 0)).await;

        assert_eq!(queue.pop().await.attempt.task_id, high);
        assert_eq!(queue.pop().await.attempt.chunk_id, ChunkId::new(0));
        assert_eq!(queue.pop().await.attempt.chunk_id, ChunkId::new(1));
    }

    #[tokio::test]
    async fn removes_items_of_one_task() {
        let queue = WorkQueue::new();
        let paused = TaskId::new();
        let other = TaskId::new();
        queue.push(0, spec(paused, 0)).await;
        queue.push(0, spec(other, 0)).await;
        queue.push(0, spec(paused, 1)).await;

        let mut removed = queue.remove_task(paused).await;
        removed.sort();
        assert_eq!(removed, [ChunkId::new(0), ChunkId::new(1)]);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = std::sync::Arc::new(WorkQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await.attempt.chunk_id }
        });
        tokio::task::yield_now().await;
        queue.push(0, spec(TaskId::new(), 7)).await;
        assert_eq!(waiter.await.unwrap(), ChunkId::new(7));
    }
}
