//! Quality evaluation of provider results.
//!
//! The [`QualityEvaluator`] scores every requested content type with its own
//! heuristic, flags the regions that fall below their type's threshold and
//! combines the sub-scores into a weighted overall value.
//!
//! | type       | heuristic                                                        |
//! |------------|------------------------------------------------------------------|
//! | text       | `0.4 * known words + 0.4 * (1 - low confidence chars) + 0.2 * (1 - garbled tokens)` |
//! | tables     | `0.6 * filled cells + 0.4 * rows matching the modal width`       |
//! | formulas   | parse factor times provider confidence                           |
//! | schematics | symbols above the floor, halved when nothing is connected        |

mod formula;
mod lexicon;
mod schematic;
mod table;
mod text;

use std::collections::BTreeMap;
use std::sync::Arc;

use nvisy_core::content::{ContentElement, ContentType, ContentTypes};
use nvisy_core::provider::ProviderResult;
use nvisy_core::quality::{FlagReason, QualityScore, Region, RegionFlag};
use serde::{Deserialize, Serialize};

pub use self::lexicon::{HeuristicLexicon, Lexicon, WordListLexicon};
use crate::engine::EngineConfig;

/// Tracing target for quality evaluation.
pub const TRACING_TARGET: &str = "nvisy_runtime::quality";

/// One value per content type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerContentType {
    pub text: f32,
    pub tables: f32,
    pub formulas: f32,
    pub schematics: f32,
}

impl PerContentType {
    /// The same value for every type.
    pub const fn uniform(value: f32) -> Self {
        Self {
            text: value,
            tables: value,
            formulas: value,
            schematics: value,
        }
    }

    /// Default acceptance thresholds. Formulas and schematics are inherently
    /// less reliable to recognize and get a lower bar.
    pub const fn thresholds() -> Self {
        Self {
            text: 0.75,
            tables: 0.75,
            formulas: 0.60,
            schematics: 0.60,
        }
    }

    pub fn get(&self, content_type: ContentType) -> f32 {
        match content_type {
            ContentType::Text => self.text,
            ContentType::Tables => self.tables,
            ContentType::Formulas => self.formulas,
            ContentType::Schematics => self.schematics,
        }
    }

    pub fn set(&mut self, content_type: ContentType, value: f32) {
        match content_type {
            ContentType::Text => self.text = value,
            ContentType::Tables => self.tables = value,
            ContentType::Formulas => self.formulas = value,
            ContentType::Schematics => self.schematics = value,
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, content_type: ContentType, value: f32) -> Self {
        self.set(content_type, value);
        self
    }

    pub fn values(&self) -> impl Iterator<Item = f32> {
        [self.text, self.tables, self.formulas, self.schematics].into_iter()
    }

    /// Smallest value among `types`, or zero when `types` is empty.
    pub fn min_over(&self, types: &ContentTypes) -> f32 {
        types
            .iter()
            .map(|content_type| self.get(content_type))
            .reduce(f32::min)
            .unwrap_or(0.0)
    }
}

/// Scores provider results against the configured thresholds.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    thresholds: PerContentType,
    weights: PerContentType,
    word_confidence_floor: f32,
    symbol_confidence_floor: f32,
    lexicon: Arc<dyn Lexicon>,
}

impl QualityEvaluator {
    /// Creates an evaluator from the engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            weights: config.weights,
            word_confidence_floor: config.word_confidence_floor,
            symbol_confidence_floor: config.symbol_confidence_floor,
            lexicon: Arc::clone(&config.lexicon),
        }
    }

    /// Acceptance threshold of a request: the lowest threshold among the
    /// requested types.
    pub fn threshold(&self, requested: &ContentTypes) -> f32 {
        self.thresholds.min_over(requested)
    }

    /// Scores `result` for the requested content types.
    ///
    /// Text with no elements scores zero. Any other requested type the
    /// provider returned nothing for gets a `not_detected` flag but no
    /// sub-score, since its absence from the page cannot be told apart from
    /// a recognition miss.
    pub fn evaluate(&self, result: &ProviderResult, requested: &ContentTypes) -> QualityScore {
        let mut sub_scores = BTreeMap::new();
        let mut flags = Vec::new();

        for content_type in requested.iter() {
            let elements: Vec<&ContentElement> = result.elements_of(content_type).collect();
            let threshold = self.thresholds.get(content_type);

            if elements.is_empty() {
                let reason = match content_type {
                    ContentType::Text => {
                        sub_scores.insert(content_type, 0.0);
                        FlagReason::EmptyOutput
                    }
                    _ => FlagReason::NotDetected,
                };
                flags.push(RegionFlag::new(Region::whole(), content_type, reason));
                continue;
            }

            let scored = match content_type {
                ContentType::Text => {
                    let spans = elements.iter().filter_map(|element| match element {
                        ContentElement::Text(span) => Some(span),
                        _ => None,
                    });
                    text::score(
                        spans,
                        self.lexicon.as_ref(),
                        self.word_confidence_floor,
                        threshold,
                    )
                }
                ContentType::Tables => {
                    let tables = elements.iter().filter_map(|element| match element {
                        ContentElement::Table(table) => Some(table),
                        _ => None,
                    });
                    table::score(tables, threshold)
                }
                ContentType::Formulas => {
                    let formulas = elements.iter().filter_map(|element| match element {
                        ContentElement::Formula(formula) => Some(formula),
                        _ => None,
                    });
                    formula::score(formulas, threshold)
                }
                ContentType::Schematics => {
                    let schematics = elements.iter().filter_map(|element| match element {
                        ContentElement::Schematic(schematic) => Some(schematic),
                        _ => None,
                    });
                    schematic::score(schematics, self.symbol_confidence_floor, threshold)
                }
            };

            sub_scores.insert(content_type, scored.value);
            flags.extend(scored.flags);
        }

        let score = QualityScore::weighted(sub_scores, |content_type| self.weights.get(content_type), flags);
        tracing::trace!(
            target: TRACING_TARGET,
            provider = %result.metadata.provider,
            overall = score.overall,
            flags = score.flags.len(),
            "result evaluated"
        );
        score
    }

    /// Returns `true` if every sub-score meets its own threshold and the
    /// overall score meets the request threshold.
    pub fn accepts(&self, score: &QualityScore, requested: &ContentTypes) -> bool {
        !score.sub_scores.is_empty()
            && score
                .sub_scores
                .iter()
                .all(|(&content_type, &value)| value >= self.thresholds.get(content_type))
            && score.overall >= self.threshold(requested)
    }
}

/// Sub-score of one content type with its flags.
#[derive(Debug, Default)]
struct TypeScore {
    value: f32,
    flags: Vec<RegionFlag>,
}

impl TypeScore {
    /// Averages per-element scores; empty input scores zero.
    fn mean(values: &[f32], flags: Vec<RegionFlag>) -> Self {
        let value = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f32>() / values.len() as f32
        };
        Self {
            value: value.clamp(0.0, 1.0),
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::mock::fixtures;
    use nvisy_core::provider::ProviderId;

    use super::*;

    fn evaluator() -> QualityEvaluator {
        QualityEvaluator::new(&EngineConfig::default())
    }

    fn result(elements: Vec<ContentElement>) -> ProviderResult {
        ProviderResult::new(ProviderId::from("stub"), elements)
    }

    #[test]
    fn fixture_text_scores_as_documented() {
        let score = evaluator().evaluate(&result(fixtures::text_pages(3, 0.5)), &ContentTypes::text());
        assert!((score.overall - 0.8).abs() < 1e-4, "{}", score.overall);
        assert!(evaluator().accepts(&score, &ContentTypes::text()));

        let clean = evaluator().evaluate(&result(fixtures::text_pages(1, 0.0)), &ContentTypes::text());
        assert!((clean.overall - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_scores_zero() {
        let score = evaluator().evaluate(&result(Vec::new()), &ContentTypes::text());
        assert_eq!(score.sub_score(ContentType::Text), Some(0.0));
        assert!(score.has_flag(FlagReason::EmptyOutput));
        assert!(!evaluator().accepts(&score, &ContentTypes::text()));
    }

    #[test]
    fn missing_schematic_is_flagged_without_sub_score() {
        let requested = ContentTypes::text().with(ContentType::Schematics);
        let score = evaluator().evaluate(&result(fixtures::text_pages(1, 0.0)), &requested);
        assert_eq!(score.sub_score(ContentType::Schematics), None);
        assert!(score.has_flag(FlagReason::NotDetected));
        assert!(evaluator().accepts(&score, &requested));
    }

    #[test]
    fn schematic_threshold_is_lower() {
        let requested = ContentTypes::new().with(ContentType::Schematics);
        let low = evaluator().evaluate(&result(vec![fixtures::schematic(0, 1, 2)]), &requested);
        let high = evaluator().evaluate(&result(vec![fixtures::schematic(0, 7, 10)]), &requested);
        assert!((low.overall - 0.5).abs() < 1e-6);
        assert!((high.overall - 0.7).abs() < 1e-6);
        assert!(!evaluator().accepts(&low, &requested));
        assert!(evaluator().accepts(&high, &requested));
    }

    #[test]
    fn every_sub_score_must_pass() {
        let requested = ContentTypes::text().with(ContentType::Tables);
        let elements = vec![
            fixtures::text_span(0, 0, 0.0),
            fixtures::table(0, 1, 4, 4, 12),
        ];
        let score = evaluator().evaluate(&result(elements), &requested);
        assert!(score.sub_score(ContentType::Tables).unwrap() < 0.75);
        assert!(!evaluator().accepts(&score, &requested));
        assert!(score.has_flag(FlagReason::SparseTable));
    }

    #[test]
    fn unrequested_types_are_ignored() {
        let elements = vec![fixtures::text_span(0, 0, 0.0), fixtures::table(0, 1, 2, 2, 4)];
        let score = evaluator().evaluate(&result(elements), &ContentTypes::text());
        assert_eq!(score.scored_types(), ContentTypes::text());
    }

    #[test]
    fn min_threshold_over_request() {
        let requested = ContentTypes::text().with(ContentType::Formulas);
        assert!((evaluator().threshold(&requested) - 0.6).abs() < f32::EPSILON);
        assert!((evaluator().threshold(&ContentTypes::text()) - 0.75).abs() < f32::EPSILON);
    }
}
