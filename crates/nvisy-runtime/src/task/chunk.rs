//! Chunks and their attempts.

use jiff::Timestamp;
use nvisy_core::document::PageRange;
use nvisy_core::provider::{ProviderError, ProviderErrorKind, ProviderResult};
use nvisy_core::quality::QualityScore;
use nvisy_core::{ChunkId, TaskId};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::selector::Strategy;
use crate::workflow::ChunkState;

/// How an attempt ended, decided once when it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The result met every threshold.
    Accepted,
    /// Another attempt was scheduled.
    RetryRequested,
    /// The chunk ran out of attempts or strategies.
    Exhausted,
}

/// Provider failure recorded on an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl From<&ProviderError> for AttemptError {
    fn from(error: &ProviderError) -> Self {
        Self {
            kind: error.kind,
            message: error.message.clone(),
        }
    }
}

/// One execution of a strategy against a chunk. Never modified once
/// recorded; retries append new attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// One-based sequence number within the chunk.
    pub sequence: u32,
    pub strategy: Strategy,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Elements with absolute page indices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProviderResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptError>,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    /// Returns `true` if the attempt produced at least one element.
    pub fn is_usable(&self) -> bool {
        self.result.as_ref().is_some_and(|result| !result.is_empty())
    }

    /// Overall quality, zero for failed attempts.
    pub fn overall(&self) -> f32 {
        self.quality.as_ref().map_or(0.0, |quality| quality.overall)
    }
}

/// A page range of a task processed as an independent unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub task_id: TaskId,
    pub pages: PageRange,
    pub state: ChunkState,
    /// Strategy of the current or next attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
}

impl Chunk {
    pub fn new(task_id: TaskId, id: ChunkId, pages: PageRange) -> Self {
        Self {
            id,
            task_id,
            pages,
            state: ChunkState::NotStarted,
            strategy: None,
            attempts: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Sequence number the next attempt will get.
    pub fn next_sequence(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    /// The attempt whose result represents this chunk.
    ///
    /// For an accepted chunk this is the accepted attempt. For an exhausted
    /// chunk it is the highest scoring usable attempt, the earliest one on
    /// ties. Other states have no best attempt yet.
    pub fn best_attempt(&self) -> Option<&Attempt> {
        match self.state {
            ChunkState::Accepted => self
                .attempts
                .iter()
                .find(|attempt| attempt.outcome == AttemptOutcome::Accepted),
            ChunkState::Exhausted => self
                .attempts
                .iter()
                .filter(|attempt| attempt.is_usable())
                .fold(None, |best: Option<&Attempt>, attempt| match best {
                    Some(best) if best.overall() >= attempt.overall() => Some(best),
                    _ => Some(attempt),
                }),
            _ => None,
        }
    }

    /// Returns `true` for a chunk kept below its quality threshold.
    pub fn is_low_confidence(&self) -> bool {
        self.state == ChunkState::Exhausted && self.best_attempt().is_some()
    }

    /// Returns `true` if no attempt produced any output.
    pub fn has_no_output(&self) -> bool {
        !self.attempts.iter().any(Attempt::is_usable)
    }

    /// Drops in-flight progress so the chunk restarts from scratch.
    pub(crate) fn restart(&mut self) {
        self.state = ChunkState::NotStarted;
        self.strategy = None;
        self.attempts.clear();
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::mock::fixtures;
    use nvisy_core::provider::{Configuration, ProviderId};

    use super::*;

    fn attempt(sequence: u32, overall: f32, outcome: AttemptOutcome) -> Attempt {
        Attempt {
            sequence,
            strategy: Strategy::new(sequence - 1, "stub", Configuration::generic()),
            started_at: Timestamp::UNIX_EPOCH,
            finished_at: Timestamp::UNIX_EPOCH,
            result: Some(ProviderResult::new(ProviderId::from("stub"), fixtures::text_pages(1, 0.0))),
            quality: Some(QualityScore {
                overall,
                ..Default::default()
            }),
            error: None,
            outcome,
        }
    }

    #[test]
    fn exhausted_chunk_keeps_highest_attempt() {
        let mut chunk = Chunk::new(TaskId::new(), ChunkId::new(0), PageRange::new(0, 1));
        chunk.attempts = vec![
            attempt(1, 0.4, AttemptOutcome::RetryRequested),
            attempt(2, 0.6, AttemptOutcome::RetryRequested),
            attempt(3, 0.6, AttemptOutcome::Exhausted),
        ];
        assert!(chunk.best_attempt().is_none());

        chunk.state = ChunkState::Exhausted;
        assert_eq!(chunk.best_attempt().map(|a| a.sequence), Some(2));
        assert!(chunk.is_low_confidence());
    }

    #[test]
    fn failed_attempts_are_not_usable() {
        let mut chunk = Chunk::new(TaskId::new(), ChunkId::new(0), PageRange::new(0, 1));
        let mut failed = attempt(1, 0.0, AttemptOutcome::Exhausted);
        failed.result = None;
        chunk.attempts.push(failed);
        chunk.state = ChunkState::Exhausted;
        assert!(chunk.best_attempt().is_none());
        assert!(chunk.has_no_output());
        assert!(!chunk.is_low_confidence());
    }
}
