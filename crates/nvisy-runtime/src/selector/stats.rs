//! Provider success rates.

use std::collections::BTreeMap;

use nvisy_core::document::DocumentKind;
use nvisy_core::provider::ProviderId;
use nvisy_core::store::{DurableStore, DurableStoreExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::RuntimeResult;
use crate::task::{AttemptOutcome, Task};

/// Rate assumed for a provider that has never run on a document kind.
pub const PRIOR_SUCCESS_RATE: f32 = 0.5;

/// Store key of the persisted table.
pub const STATS_KEY: &str = "stats/providers";

/// Success rate of one provider on one document kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderStat {
    /// Exponential moving average of the per-task acceptance ratio.
    pub success_rate: f32,
    /// Number of tasks that updated the average.
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StatRecord {
    provider: ProviderId,
    kind: DocumentKind,
    #[serde(flatten)]
    stat: ProviderStat,
}

/// Point-in-time copy of all success rates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStats {
    entries: BTreeMap<(ProviderId, DocumentKind), ProviderStat>,
}

impl ProviderStats {
    /// Success rate of `provider` on `kind`, the prior when unknown.
    pub fn success_rate(&self, provider: &ProviderId, kind: DocumentKind) -> f32 {
        self.get(provider, kind)
            .map_or(PRIOR_SUCCESS_RATE, |stat| stat.success_rate)
    }

    pub fn get(&self, provider: &ProviderId, kind: DocumentKind) -> Option<&ProviderStat> {
        self.entries.get(&(provider.clone(), kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds `observation` into the average of `provider` on `kind`.
    fn observe(&mut self, provider: ProviderId, kind: DocumentKind, observation: f32, alpha: f32) {
        let entry = self
            .entries
            .entry((provider, kind))
            .or_insert(ProviderStat {
                success_rate: PRIOR_SUCCESS_RATE,
                samples: 0,
            });
        entry.success_rate = (alpha * observation + (1.0 - alpha) * entry.success_rate).clamp(0.0, 1.0);
        entry.samples += 1;
    }

    fn to_records(&self) -> Vec<StatRecord> {
        self.entries
            .iter()
            .map(|((provider, kind), stat)| StatRecord {
                provider: provider.clone(),
                kind: *kind,
                stat: *stat,
            })
            .collect()
    }

    fn from_records(records: Vec<StatRecord>) -> Self {
        let entries = records
            .into_iter()
            .map(|record| ((record.provider, record.kind), record.stat))
            .collect();
        Self { entries }
    }
}

/// Holds the success-rate table and persists it.
///
/// Reads come from any task; updates are only issued by the coordinator, once
/// per finished task.
#[derive(Debug)]
pub struct ProviderStatsStore {
    alpha: f32,
    stats: RwLock<ProviderStats>,
}

impl ProviderStatsStore {
    /// Creates an empty table.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            stats: RwLock::new(ProviderStats::default()),
        }
    }

    /// Loads the persisted table, starting empty if none exists.
    pub async fn load(store: &dyn DurableStore, alpha: f32) -> RuntimeResult<Self> {
        let records: Vec<StatRecord> = store.get_json(STATS_KEY).await?.unwrap_or_default();
        Ok(Self {
            alpha,
            stats: RwLock::new(ProviderStats::from_records(records)),
        })
    }

    /// Returns a copy of the current table.
    pub async fn snapshot(&self) -> ProviderStats {
        self.stats.read().await.clone()
    }

    /// Updates the averages with the attempts of a finished task. Each
    /// provider contributes one observation: the share of its attempts that
    /// were accepted.
    pub async fn record(&self, task: &Task) {
        let Some(kind) = task.document.as_ref().map(|document| document.kind) else {
            return;
        };

        let mut tally = BTreeMap::<ProviderId, (u32, u32)>::new();
        for attempt in task.chunks.iter().flat_map(|chunk| &chunk.attempts) {
            let (accepted, total) = tally.entry(attempt.strategy.provider.clone()).or_default();
            *total += 1;
            if attempt.outcome == AttemptOutcome::Accepted {
                *accepted += 1;
            }
        }

        let mut stats = self.stats.write().await;
        for (provider, (accepted, total)) in tally {
            stats.observe(provider, kind, accepted as f32 / total as f32, self.alpha);
        }
    }

    /// Writes the table to the store.
    pub async fn persist(&self, store: &dyn DurableStore) -> RuntimeResult<()> {
        let records = self.stats.read().await.to_records();
        store.put_json(STATS_KEY, &records).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::store::MemoryStore;

    use super::*;

    #[test]
    fn unknown_provider_uses_prior() {
        let stats = ProviderStats::default();
        assert_eq!(stats.success_rate(&"x".into(), DocumentKind::Scanned), PRIOR_SUCCESS_RATE);
    }

    #[test]
    fn moving_average_converges() {
        let mut stats = ProviderStats::default();
        let provider = ProviderId::from("tesseract");
        stats.observe(provider.clone(), DocumentKind::Scanned, 1.0, 0.2);
        assert!((stats.success_rate(&provider, DocumentKind::Scanned) - 0.6).abs() < 1e-6);
        for _ in 0..50 {
            stats.observe(provider.clone(), DocumentKind::Scanned, 1.0, 0.2);
        }
        assert!(stats.success_rate(&provider, DocumentKind::Scanned) > 0.99);
        assert_eq!(stats.success_rate(&provider, DocumentKind::Image), PRIOR_SUCCESS_RATE);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let store = MemoryStore::new();
        let table = ProviderStatsStore::new(0.2);
        table
            .stats
            .write()
            .await
            .observe("cloud".into(), DocumentKind::Image, 0.0, 0.2);
        table.persist(&store).await.unwrap();

        let reloaded = ProviderStatsStore::load(&store, 0.2).await.unwrap();
        let rate = reloaded.snapshot().await.success_rate(&"cloud".into(), DocumentKind::Image);
        assert!((rate - 0.4).abs() < 1e-6);
    }
}
