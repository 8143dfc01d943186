//! Strategy selection.
//!
//! The selector ranks registered providers for a document profile. A
//! provider's score blends its static suitability for the document kind and
//! requested content with its historical success rate on that kind:
//!
//! ```text
//! score = static_weight * suitability + (1 - static_weight) * success_rate
//! ```
//!
//! Equal scores rank the cheaper provider first, then the lower id.

mod stats;
mod suitability;

use std::collections::BTreeSet;

use nvisy_core::content::{ContentType, ContentTypes};
use nvisy_core::document::{DocumentKind, DocumentProfile};
use nvisy_core::provider::{Configuration, ProviderClass, ProviderDescriptor, ProviderId, ProviderRole};
use serde::{Deserialize, Serialize};

pub use self::stats::{PRIOR_SUCCESS_RATE, ProviderStat, ProviderStats, ProviderStatsStore, STATS_KEY};
use crate::engine::EngineConfig;

/// Tracing target for strategy selection.
pub const TRACING_TARGET: &str = "nvisy_runtime::selector";

/// DPI requested from engines that rasterize scanned pages.
const SCAN_DPI: u32 = 300;

/// A provider and configuration to try, with its position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Zero for the most promising strategy.
    pub rank: u32,
    pub provider: ProviderId,
    pub configuration: Configuration,
}

impl Strategy {
    pub fn new(rank: u32, provider: impl Into<ProviderId>, configuration: Configuration) -> Self {
        Self {
            rank,
            provider: provider.into(),
            configuration,
        }
    }
}

/// Ranked strategies for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub strategies: Vec<Strategy>,
    /// No provider suited the document and a generic fallback was chosen.
    pub low_confidence_expected: bool,
}

/// Ranks providers for a document profile.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    static_weight: f32,
    default_languages: Vec<String>,
}

impl StrategySelector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            static_weight: config.static_weight,
            default_languages: config.default_languages.clone(),
        }
    }

    /// Returns the ranked strategies for `profile`, best first and at most one
    /// per provider.
    ///
    /// Only providers that accept the document kind and can extract at least
    /// one requested content type qualify. Without any, the selector falls
    /// back to a local engine with the generic configuration and marks the
    /// selection as low confidence. `None` means not even a fallback exists.
    pub fn select<'a>(
        &self,
        profile: &DocumentProfile,
        requested: &ContentTypes,
        providers: impl IntoIterator<Item = &'a ProviderDescriptor>,
        stats: &ProviderStats,
    ) -> Option<Selection> {
        let providers: Vec<&ProviderDescriptor> = providers.into_iter().collect();
        let mut seen = BTreeSet::new();
        let mut candidates: Vec<(i64, &ProviderDescriptor)> = providers
            .iter()
            .copied()
            .filter(|descriptor| descriptor.supports(profile.kind))
            .filter(|descriptor| !descriptor.capabilities.intersection(requested).is_empty())
            .filter(|descriptor| seen.insert(descriptor.id.clone()))
            .map(|descriptor| (self.score(descriptor, profile, requested, stats), descriptor))
            .collect();

        candidates.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .cmp(a_score)
                .then_with(|| a.cost_per_page.total_cmp(&b.cost_per_page))
                .then_with(|| a.id.cmp(&b.id))
        });

        if candidates.is_empty() {
            let fallback = fallback(&providers)?;
            tracing::warn!(
                target: TRACING_TARGET,
                kind = %profile.kind,
                requested = %requested,
                fallback = %fallback.id,
                "no provider suits the document, using generic fallback"
            );
            let configuration = Configuration::generic().with_languages(self.languages(profile));
            return Some(Selection {
                strategies: vec![Strategy::new(0, fallback.id.clone(), configuration)],
                low_confidence_expected: true,
            });
        }

        let strategies: Vec<Strategy> = candidates
            .into_iter()
            .enumerate()
            .map(|(rank, (_, descriptor))| {
                Strategy::new(
                    rank as u32,
                    descriptor.id.clone(),
                    self.configuration(descriptor, profile, requested),
                )
            })
            .collect();

        tracing::debug!(
            target: TRACING_TARGET,
            kind = %profile.kind,
            requested = %requested,
            ranking = ?strategies.iter().map(|s| s.provider.as_str()).collect::<Vec<_>>(),
            "strategies selected"
        );
        Some(Selection {
            strategies,
            low_confidence_expected: false,
        })
    }

    /// Blended score, quantized so that near-equal floats tie.
    fn score(
        &self,
        descriptor: &ProviderDescriptor,
        profile: &DocumentProfile,
        requested: &ContentTypes,
        stats: &ProviderStats,
    ) -> i64 {
        let suitability = suitability::score(descriptor, profile, requested);
        let history = stats.success_rate(&descriptor.id, profile.kind);
        let blended = self.static_weight * suitability + (1.0 - self.static_weight) * history;
        (blended * 10_000.0).round() as i64
    }

    fn configuration(
        &self,
        descriptor: &ProviderDescriptor,
        profile: &DocumentProfile,
        requested: &ContentTypes,
    ) -> Configuration {
        let preset = if requested.contains(ContentType::Schematics) {
            "schematic"
        } else if requested.contains(ContentType::Tables) || requested.contains(ContentType::Formulas) {
            "tables"
        } else {
            Configuration::GENERIC
        };

        let mut configuration = Configuration::new(preset).with_languages(self.languages(profile));
        let rasterizes = descriptor.class == ProviderClass::Local;
        if rasterizes && matches!(profile.kind, DocumentKind::Scanned | DocumentKind::MixedTechnical) {
            configuration = configuration.with_dpi(SCAN_DPI);
        }
        configuration
    }

    fn languages(&self, profile: &DocumentProfile) -> Vec<String> {
        if profile.languages.is_empty() {
            self.default_languages.clone()
        } else {
            profile.languages.clone()
        }
    }
}

/// Local engine first, then any local provider.
fn fallback<'a>(providers: &[&'a ProviderDescriptor]) -> Option<&'a ProviderDescriptor> {
    let local = providers
        .iter()
        .copied()
        .filter(|descriptor| descriptor.class == ProviderClass::Local);
    local
        .clone()
        .filter(|descriptor| descriptor.role == ProviderRole::LocalEngine)
        .min_by(|a, b| a.id.cmp(&b.id))
        .or_else(|| local.min_by(|a, b| a.id.cmp(&b.id)))
}
