//! Processing tasks.

mod checkpoint;
mod chunk;

use std::collections::BTreeSet;

use jiff::Timestamp;
use nvisy_core::content::ContentTypes;
use nvisy_core::document::{Document, DocumentId};
use nvisy_core::provider::ProviderId;
use nvisy_core::{ChunkId, TaskId};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

pub use self::checkpoint::Checkpoint;
pub use self::chunk::{Attempt, AttemptError, AttemptOutcome, Chunk};
use crate::selector::Strategy;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, no chunk dispatched yet.
    Pending,
    /// Chunks are being dispatched.
    Running,
    /// No new attempts are dispatched until resumed.
    Paused,
    /// Every chunk reached a terminal state.
    Completed,
    /// The input was unusable or no attempt produced output.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What a caller asks for when submitting a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub content_types: ContentTypes,
    /// Higher priorities are dispatched first.
    #[serde(default)]
    pub priority: i32,
    /// Declared document languages; the engine default applies when empty.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl SubmitRequest {
    pub fn new(content_types: ContentTypes) -> Self {
        Self {
            content_types,
            priority: 0,
            languages: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_languages(mut self, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }
}

/// A document being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Content address of the source bytes.
    pub document_id: DocumentId,
    /// Inspection result, absent when the source could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    pub content_types: ContentTypes,
    pub status: TaskStatus,
    pub priority: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Ranked strategies, fixed at submission.
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// No provider suited the document; the fallback strategy was used.
    #[serde(default)]
    pub low_confidence_expected: bool,
    /// Providers that failed fatally and are skipped for the rest of the task.
    #[serde(default)]
    pub excluded_providers: BTreeSet<ProviderId>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// Sequence of the latest checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<u64>,
    /// Human readable notes: configuration errors, failure causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl Task {
    /// Key prefix of task records.
    pub const STORAGE_PREFIX: &'static str = "tasks/";

    pub(crate) fn new(id: TaskId, document_id: DocumentId, request: &SubmitRequest) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            document_id,
            document: None,
            content_types: request.content_types.clone(),
            status: TaskStatus::Pending,
            priority: request.priority,
            created_at: now,
            updated_at: now,
            strategies: Vec::new(),
            low_confidence_expected: false,
            excluded_providers: BTreeSet::new(),
            chunks: Vec::new(),
            checkpoint: None,
            diagnostics: Vec::new(),
        }
    }

    /// Store key of a task record.
    pub fn storage_key(id: TaskId) -> String {
        format!("{}{id}", Self::STORAGE_PREFIX)
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.index() as usize)
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(id.index() as usize)
    }

    /// Returns `true` once every chunk reached a terminal state.
    pub fn all_chunks_terminal(&self) -> bool {
        self.chunks.iter().all(Chunk::is_terminal)
    }

    /// Returns `true` if any part of the result falls short of the
    /// thresholds or no suitable provider existed.
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence_expected || self.chunks.iter().any(Chunk::is_low_confidence)
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert_eq!(TaskStatus::Running.to_string(), "running");
    }

    #[test]
    fn task_key_uses_prefix() {
        let id = TaskId::new();
        assert_eq!(Task::storage_key(id), format!("tasks/{id}"));
    }
}
