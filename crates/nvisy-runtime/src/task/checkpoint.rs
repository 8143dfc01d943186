//! Append-only checkpoints.
//!
//! Each checkpoint is written under its own key and never overwritten. It
//! carries snapshots of the chunks that became terminal since the previous
//! checkpoint, so folding all checkpoints of a task in sequence order yields
//! every terminal chunk. In-flight chunks never appear in a checkpoint.

use std::collections::{BTreeMap, BTreeSet};

use jiff::Timestamp;
use nvisy_core::provider::ProviderId;
use nvisy_core::{ChunkId, TaskId};
use serde::{Deserialize, Serialize};

use super::{Chunk, Task};

/// Durable record of a task's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: TaskId,
    /// Strictly increasing per task, starting at one.
    pub sequence: u64,
    pub written_at: Timestamp,
    /// Chunk whose completion triggered this checkpoint.
    pub last_completed: ChunkId,
    /// Attempts used so far, by chunk index, terminal chunks only.
    pub attempt_counters: BTreeMap<u32, u32>,
    /// Every chunk terminal as of this checkpoint.
    pub completed: Vec<ChunkId>,
    /// Snapshots of the chunks that became terminal with this checkpoint.
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub excluded_providers: BTreeSet<ProviderId>,
}

impl Checkpoint {
    /// Key prefix of all checkpoints of a task.
    pub fn prefix(task_id: TaskId) -> String {
        format!("checkpoints/{task_id}/")
    }

    /// Zero-padded so lexical key order equals sequence order.
    pub fn storage_key(task_id: TaskId, sequence: u64) -> String {
        format!("{}{sequence:010}", Self::prefix(task_id))
    }

    /// Captures `chunks` of `task` as the next checkpoint.
    ///
    /// Returns `None` if none of the given chunks is terminal.
    pub(crate) fn capture(task: &Task, chunks: &[ChunkId]) -> Option<Self> {
        let snapshots: Vec<Chunk> = chunks
            .iter()
            .filter_map(|&id| task.chunk(id))
            .filter(|chunk| chunk.is_terminal())
            .cloned()
            .collect();
        let last_completed = snapshots.last()?.id;

        let terminal = task.chunks.iter().filter(|chunk| chunk.is_terminal());
        Some(Self {
            task_id: task.id,
            sequence: task.checkpoint.unwrap_or(0) + 1,
            written_at: Timestamp::now(),
            last_completed,
            attempt_counters: terminal
                .clone()
                .map(|chunk| (chunk.id.index(), chunk.attempts.len() as u32))
                .collect(),
            completed: terminal.map(|chunk| chunk.id).collect(),
            chunks: snapshots,
            excluded_providers: task.excluded_providers.clone(),
        })
    }

    pub fn key(&self) -> String {
        Self::storage_key(self.task_id, self.sequence)
    }

    /// Applies this checkpoint to `task`. Checkpoints must be applied in
    /// sequence order; stale ones are ignored.
    pub(crate) fn apply(self, task: &mut Task) {
        if task.checkpoint.is_some_and(|current| current >= self.sequence) {
            return;
        }
        for snapshot in self.chunks {
            if let Some(chunk) = task.chunk_mut(snapshot.id) {
                *chunk = snapshot;
            }
        }
        task.excluded_providers.extend(self.excluded_providers);
        task.checkpoint = Some(self.sequence);
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::ContentTypes;
    use nvisy_core::document::{DocumentId, PageRange};

    use super::*;
    use crate::task::SubmitRequest;
    use crate::workflow::ChunkState;

    fn task() -> Task {
        let mut task = Task::new(
            TaskId::new(),
            DocumentId::from_bytes(b"doc"),
            &SubmitRequest::new(ContentTypes::text()),
        );
        task.chunks = (0..3)
            .map(|i| Chunk::new(task.id, ChunkId::new(i), PageRange::new(i * 5, i * 5 + 5)))
            .collect();
        task
    }

    #[test]
    fn keys_sort_by_sequence() {
        let id = TaskId::new();
        assert!(Checkpoint::storage_key(id, 9) < Checkpoint::storage_key(id, 10));
        assert!(Checkpoint::storage_key(id, 1).starts_with(&Checkpoint::prefix(id)));
    }

    #[test]
    fn never_captures_in_flight_chunks() {
        let mut task = task();
        task.chunks[0].state = ChunkState::Attempting;
        assert!(Checkpoint::capture(&task, &[ChunkId::new(0)]).is_none());

        task.chunks[1].state = ChunkState::Accepted;
        let checkpoint = Checkpoint::capture(&task, &[ChunkId::new(0), ChunkId::new(1)]).unwrap();
        assert_eq!(checkpoint.sequence, 1);
        assert_eq!(checkpoint.completed, vec![ChunkId::new(1)]);
        assert_eq!(checkpoint.chunks.len(), 1);
    }

    #[test]
    fn applying_restores_terminal_chunks_and_advances() {
        let mut source = task();
        source.chunks[2].state = ChunkState::Exhausted;
        let checkpoint = Checkpoint::capture(&source, &[ChunkId::new(2)]).unwrap();

        let mut restored = source.clone();
        restored.chunks[2].state = ChunkState::NotStarted;
        checkpoint.clone().apply(&mut restored);
        assert_eq!(restored.chunks[2].state, ChunkState::Exhausted);
        assert_eq!(restored.checkpoint, Some(1));

        restored.chunks[2].state = ChunkState::NotStarted;
        checkpoint.apply(&mut restored);
        assert_eq!(restored.chunks[2].state, ChunkState::NotStarted);
    }
}
