//! Quality scores and region flags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::content::{ContentType, ContentTypes};

/// Why a region of the output was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Share of low confidence characters above tolerance.
    LowConfidence,
    /// Tokens contain long runs of non-alphanumeric characters.
    Garbled,
    /// Few tokens were found in the lexicon.
    UnknownWords,
    /// Many table cells are empty or placeholders.
    SparseTable,
    /// Rows disagree on column count.
    IrregularTable,
    /// Formula output did not parse as LaTeX.
    UnparsedFormula,
    /// Formula came back as free text.
    FreeTextFormula,
    /// Schematic symbols below the confidence floor.
    LowConfidenceSymbols,
    /// Several symbols but no connections between them.
    MissingConnections,
    /// A requested content type was not found at all.
    NotDetected,
    /// The provider returned nothing for a requested type that must be present.
    EmptyOutput,
    /// No strategy was suitable; fell back to a generic one.
    LowConfidenceExpected,
}

/// The region a flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Absolute page, `None` when the flag covers the whole chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Reading order of the element within the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl Region {
    pub fn element(page: u32, order: u32) -> Self {
        Self {
            page: Some(page),
            order: Some(order),
        }
    }

    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            order: None,
        }
    }

    pub fn whole() -> Self {
        Self {
            page: None,
            order: None,
        }
    }
}

/// A flagged, low quality region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionFlag {
    pub region: Region,
    pub content_type: ContentType,
    pub reason: FlagReason,
}

impl RegionFlag {
    pub fn new(region: Region, content_type: ContentType, reason: FlagReason) -> Self {
        Self {
            region,
            content_type,
            reason,
        }
    }
}

/// Quality of a recognition result, all values in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall: f32,
    /// One entry per requested content type that was scored.
    #[serde(default)]
    pub sub_scores: BTreeMap<ContentType, f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<RegionFlag>,
}

impl QualityScore {
    /// A zero score with no sub-scores.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a score whose overall value is the weighted average of the
    /// sub-scores present, or zero when nothing was scored.
    pub fn weighted(
        sub_scores: BTreeMap<ContentType, f32>,
        weight: impl Fn(ContentType) -> f32,
        flags: Vec<RegionFlag>,
    ) -> Self {
        let (sum, total) = sub_scores
            .iter()
            .map(|(&content_type, &value)| (value, weight(content_type).max(0.0)))
            .fold((0.0f32, 0.0f32), |(sum, total), (value, w)| {
                (sum + value * w, total + w)
            });
        let overall = if total > 0.0 { sum / total } else { 0.0 };
        Self {
            overall: overall.clamp(0.0, 1.0),
            sub_scores,
            flags,
        }
    }

    pub fn sub_score(&self, content_type: ContentType) -> Option<f32> {
        self.sub_scores.get(&content_type).copied()
    }

    /// Returns `true` if some flag was raised with `reason`.
    pub fn has_flag(&self, reason: FlagReason) -> bool {
        self.flags.iter().any(|flag| flag.reason == reason)
    }

    /// Content types that received a sub-score.
    pub fn scored_types(&self) -> ContentTypes {
        self.sub_scores.keys().copied().collect()
    }

    /// Aggregates chunk scores: the overall value and every sub-score are the
    /// minimum across inputs, flags are the union. No inputs yields zero.
    pub fn aggregate<'a>(scores: impl IntoIterator<Item = &'a QualityScore>) -> Self {
        let mut overall: Option<f32> = None;
        let mut sub_scores = BTreeMap::<ContentType, f32>::new();
        let mut flags = Vec::new();

        for score in scores {
            overall = Some(overall.map_or(score.overall, |o| o.min(score.overall)));
            for (&content_type, &value) in &score.sub_scores {
                sub_scores
                    .entry(content_type)
                    .and_modify(|current| *current = current.min(value))
                    .or_insert(value);
            }
            for flag in &score.flags {
                if !flags.contains(flag) {
                    flags.push(*flag);
                }
            }
        }

        Self {
            overall: overall.unwrap_or(0.0),
            sub_scores,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(overall: f32) -> QualityScore {
        QualityScore {
            overall,
            ..Default::default()
        }
    }

    #[test]
    fn aggregate_takes_minimum() {
        let scores = [score(0.9), score(0.95), score(0.4)];
        let aggregate = QualityScore::aggregate(&scores);
        assert!((aggregate.overall - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        assert_eq!(QualityScore::aggregate([]).overall, 0.0);
    }

    #[test]
    fn aggregate_merges_sub_scores_and_flags() {
        let flag = RegionFlag::new(Region::page(3), ContentType::Text, FlagReason::Garbled);
        let a = QualityScore::weighted(
            BTreeMap::from([(ContentType::Text, 0.8), (ContentType::Tables, 0.6)]),
            |_| 1.0,
            vec![flag],
        );
        let b = QualityScore::weighted(BTreeMap::from([(ContentType::Text, 0.7)]), |_| 1.0, vec![flag]);
        let aggregate = QualityScore::aggregate([&a, &b]);
        assert_eq!(aggregate.sub_score(ContentType::Text), Some(0.7));
        assert_eq!(aggregate.sub_score(ContentType::Tables), Some(0.6));
        assert_eq!(aggregate.flags.len(), 1);
    }

    #[test]
    fn overall_is_weighted_average() {
        let score = QualityScore::weighted(
            BTreeMap::from([(ContentType::Text, 0.9), (ContentType::Schematics, 0.5)]),
            |content_type| match content_type {
                ContentType::Text => 3.0,
                _ => 1.0,
            },
            Vec::new(),
        );
        assert!((score.overall - 0.8).abs() < 1e-6);
        assert_eq!(QualityScore::weighted(BTreeMap::new(), |_| 1.0, Vec::new()).overall, 0.0);
    }
}
