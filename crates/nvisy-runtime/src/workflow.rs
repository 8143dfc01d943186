//! Per-chunk reprocessing state machine.
//!
//! ```text
//! NotStarted ─▶ Attempting ─┬─▶ Accepted
//!                   ▲       ├─▶ RetryPending ─┐
//!                   │       └─▶ Exhausted     │
//!                   └─────────────────────────┘
//! ```
//!
//! Any non-terminal state may also move to `Cancelled`. The machine is pure:
//! [`ReprocessingWorkflow::decide`] looks at the recorded attempts and the
//! report of the attempt that just finished and returns the next
//! [`Transition`]. The coordinator applies it and appends the attempt.

use std::collections::BTreeSet;
use std::time::Duration;

use nvisy_core::provider::{ProviderErrorKind, ProviderId};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::engine::EngineConfig;
use crate::selector::Strategy;
use crate::task::{AttemptOutcome, Chunk};

/// State of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    NotStarted,
    /// Dispatched to the current strategy's provider.
    Attempting,
    /// Waiting to be dispatched to the next strategy.
    RetryPending,
    Accepted,
    /// Out of attempts or strategies; the best attempt is kept.
    Exhausted,
    Cancelled,
}

impl ChunkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted | Self::Cancelled)
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ChunkState::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (NotStarted, Attempting) | (RetryPending, Attempting) => true,
            (Attempting, Accepted | RetryPending | Exhausted) => true,
            _ => false,
        }
    }
}

/// How the attempt that just finished went.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptReport {
    /// The provider answered and the result was scored.
    Scored { accepted: bool },
    /// The provider failed.
    Failed {
        kind: ProviderErrorKind,
        retry_after: Option<Duration>,
    },
}

/// Next step for a chunk after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Accept,
    /// Dispatch `strategy` after `delay`.
    RetryPending { strategy: Strategy, delay: Duration },
    Exhaust,
}

impl Transition {
    /// Outcome to record on the attempt that led here.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Accept => AttemptOutcome::Accepted,
            Self::RetryPending { .. } => AttemptOutcome::RetryRequested,
            Self::Exhaust => AttemptOutcome::Exhausted,
        }
    }

    /// State the chunk moves to.
    pub fn state(&self) -> ChunkState {
        match self {
            Self::Accept => ChunkState::Accepted,
            Self::RetryPending { .. } => ChunkState::RetryPending,
            Self::Exhaust => ChunkState::Exhausted,
        }
    }
}

/// Retry policy of the reprocessing loop.
#[derive(Debug, Clone)]
pub struct ReprocessingWorkflow {
    max_attempts: u32,
    transient_retries: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl ReprocessingWorkflow {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            transient_retries: config.transient_retries,
            backoff_initial: config.backoff_initial,
            backoff_max: config.backoff_max,
        }
    }

    /// Strategy for a chunk's first attempt: the best ranked one whose
    /// provider is not excluded.
    pub fn first_strategy(
        &self,
        strategies: &[Strategy],
        excluded: &BTreeSet<ProviderId>,
    ) -> Option<Strategy> {
        strategies
            .iter()
            .filter(|strategy| !excluded.contains(&strategy.provider))
            .min_by_key(|strategy| strategy.rank)
            .cloned()
    }

    /// Decides what follows the attempt described by `report`.
    ///
    /// `chunk` holds the attempts recorded before this one and its current
    /// strategy. `excluded` must already contain the provider if this
    /// attempt failed fatally.
    pub fn decide(
        &self,
        chunk: &Chunk,
        report: AttemptReport,
        strategies: &[Strategy],
        excluded: &BTreeSet<ProviderId>,
    ) -> Transition {
        let Some(current) = chunk.strategy.as_ref() else {
            return Transition::Exhaust;
        };
        if let AttemptReport::Scored { accepted: true } = report {
            return Transition::Accept;
        }

        let used = chunk.attempts.len() as u32 + 1;
        if used >= self.max_attempts {
            return Transition::Exhaust;
        }

        if let AttemptReport::Failed {
            kind: ProviderErrorKind::Transient,
            retry_after,
        } = report
        {
            let on_strategy = 1 + chunk
                .attempts
                .iter()
                .rev()
                .take_while(|attempt| attempt.strategy.rank == current.rank)
                .count() as u32;
            if on_strategy <= self.transient_retries && !excluded.contains(&current.provider) {
                let delay = retry_after
                    .unwrap_or_else(|| self.backoff(on_strategy))
                    .min(self.backoff_max);
                return Transition::RetryPending {
                    strategy: current.clone(),
                    delay,
                };
            }
        }

        match self.next_strategy(current, strategies, excluded) {
            Some(strategy) => Transition::RetryPending {
                strategy,
                delay: Duration::ZERO,
            },
            None => Transition::Exhaust,
        }
    }

    pub(crate) fn next_strategy(
        &self,
        current: &Strategy,
        strategies: &[Strategy],
        excluded: &BTreeSet<ProviderId>,
    ) -> Option<Strategy> {
        strategies
            .iter()
            .filter(|strategy| strategy.rank > current.rank && !excluded.contains(&strategy.provider))
            .min_by_key(|strategy| strategy.rank)
            .cloned()
    }

    fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_initial
            .saturating_mul(1 << exponent)
            .min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use nvisy_core::document::PageRange;
    use nvisy_core::provider::Configuration;
    use nvisy_core::{ChunkId, TaskId};

    use super::*;
    use crate::task::Attempt;

    fn strategies(ids: &[&str]) -> Vec<Strategy> {
        ids.iter()
            .enumerate()
            .map(|(rank, id)| Strategy::new(rank as u32, *id, Configuration::generic()))
            .collect()
    }

    fn chunk(strategy: &Strategy) -> Chunk {
        let mut chunk = Chunk::new(TaskId::new(), ChunkId::new(0), PageRange::new(0, 1));
        chunk.state = ChunkState::Attempting;
        chunk.strategy = Some(strategy.clone());
        chunk
    }

    fn record(chunk: &mut Chunk, transition: &Transition) {
        let strategy = chunk.strategy.clone().unwrap();
        chunk.attempts.push(Attempt {
            sequence: chunk.next_sequence(),
            strategy,
            started_at: Timestamp::UNIX_EPOCH,
            finished_at: Timestamp::UNIX_EPOCH,
            result: None,
            quality: None,
            error: None,
            outcome: transition.outcome(),
        });
        if let Transition::RetryPending { strategy, .. } = transition {
            chunk.strategy = Some(strategy.clone());
        }
        chunk.state = transition.state();
    }

    const BELOW: AttemptReport = AttemptReport::Scored { accepted: false };

    fn failed(kind: ProviderErrorKind) -> AttemptReport {
        AttemptReport::Failed {
            kind,
            retry_after: None,
        }
    }

    #[test]
    fn legal_transitions() {
        use ChunkState::*;
        assert!(NotStarted.can_transition_to(Attempting));
        assert!(Attempting.can_transition_to(RetryPending));
        assert!(RetryPending.can_transition_to(Attempting));
        assert!(RetryPending.can_transition_to(Cancelled));
        assert!(!NotStarted.can_transition_to(Accepted));
        assert!(!Accepted.can_transition_to(Attempting));
        assert!(!Exhausted.can_transition_to(Cancelled));
    }

    #[test]
    fn budget_is_bounded_by_strategy_count() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a", "b"]);
        let excluded = BTreeSet::new();
        let mut chunk = chunk(&strategies[0]);

        let first = workflow.decide(&chunk, BELOW, &strategies, &excluded);
        assert!(matches!(&first, Transition::RetryPending { strategy, delay } if strategy.rank == 1 && delay.is_zero()));
        record(&mut chunk, &first);

        let second = workflow.decide(&chunk, BELOW, &strategies, &excluded);
        assert_eq!(second, Transition::Exhaust);
        record(&mut chunk, &second);
        assert_eq!(chunk.attempts.len(), 2);
    }

    #[test]
    fn budget_is_bounded_by_max_attempts() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a", "b", "c", "d"]);
        let excluded = BTreeSet::new();
        let mut chunk = chunk(&strategies[0]);

        for _ in 0..2 {
            let transition = workflow.decide(&chunk, BELOW, &strategies, &excluded);
            assert!(matches!(transition, Transition::RetryPending { .. }));
            record(&mut chunk, &transition);
        }
        assert_eq!(workflow.decide(&chunk, BELOW, &strategies, &excluded), Transition::Exhaust);
    }

    #[test]
    fn transient_retries_same_strategy_once() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a", "b"]);
        let excluded = BTreeSet::new();
        let mut chunk = chunk(&strategies[0]);

        let retry = workflow.decide(&chunk, failed(ProviderErrorKind::Transient), &strategies, &excluded);
        assert_eq!(
            retry,
            Transition::RetryPending {
                strategy: strategies[0].clone(),
                delay: Duration::from_millis(500),
            }
        );
        record(&mut chunk, &retry);

        let escalate = workflow.decide(&chunk, failed(ProviderErrorKind::Transient), &strategies, &excluded);
        assert!(matches!(escalate, Transition::RetryPending { strategy, .. } if strategy.rank == 1));
    }

    #[test]
    fn provider_delay_overrides_backoff() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a"]);
        let chunk = chunk(&strategies[0]);
        let report = AttemptReport::Failed {
            kind: ProviderErrorKind::Transient,
            retry_after: Some(Duration::from_secs(60)),
        };
        let transition = workflow.decide(&chunk, report, &strategies, &BTreeSet::new());
        assert!(matches!(transition, Transition::RetryPending { delay, .. } if delay == Duration::from_secs(10)));
    }

    #[test]
    fn unsupported_input_escalates_without_delay() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a", "b"]);
        let chunk = chunk(&strategies[0]);
        let transition = workflow.decide(
            &chunk,
            failed(ProviderErrorKind::UnsupportedInput),
            &strategies,
            &BTreeSet::new(),
        );
        assert!(matches!(transition, Transition::RetryPending { strategy, delay } if strategy.rank == 1 && delay.is_zero()));
    }

    #[test]
    fn fatal_without_alternative_exhausts() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a"]);
        let chunk = chunk(&strategies[0]);
        let excluded = BTreeSet::from([ProviderId::from("a")]);
        let transition = workflow.decide(&chunk, failed(ProviderErrorKind::Fatal), &strategies, &excluded);
        assert_eq!(transition, Transition::Exhaust);
        assert!(workflow.first_strategy(&strategies, &excluded).is_none());
    }

    #[test]
    fn accepted_wins_over_budget() {
        let workflow = ReprocessingWorkflow::new(&EngineConfig::default());
        let strategies = strategies(&["a"]);
        let chunk = chunk(&strategies[0]);
        let transition = workflow.decide(
            &chunk,
            AttemptReport::Scored { accepted: true },
            &strategies,
            &BTreeSet::new(),
        );
        assert_eq!(transition, Transition::Accept);
    }
}
