//! Static suitability of a provider role for a document.

use nvisy_core::content::{ContentType, ContentTypes};
use nvisy_core::document::{DocumentKind, DocumentProfile};
use nvisy_core::provider::{ProviderDescriptor, ProviderRole};

/// Base suitability of a role for a document kind.
fn base(role: ProviderRole, kind: DocumentKind) -> f32 {
    use DocumentKind::*;
    use ProviderRole::*;

    match (role, kind) {
        (LocalEngine, BornDigital) => 0.80,
        (LocalEngine, Scanned) => 0.80,
        (LocalEngine, Image) => 0.70,
        (LocalEngine, MixedTechnical) => 0.30,

        (SearchablePdf, BornDigital) => 0.70,
        (SearchablePdf, Scanned) => 0.75,
        (SearchablePdf, Image) => 0.50,
        (SearchablePdf, MixedTechnical) => 0.30,

        (DocumentStructure, BornDigital) => 0.70,
        (DocumentStructure, Scanned) => 0.65,
        (DocumentStructure, Image) => 0.60,
        (DocumentStructure, MixedTechnical) => 0.60,

        (ImageUnderstanding, BornDigital) => 0.50,
        (ImageUnderstanding, Scanned) => 0.50,
        (ImageUnderstanding, Image) => 0.65,
        (ImageUnderstanding, MixedTechnical) => 0.80,
    }
}

/// Adjustment for the requested content types.
fn content_adjustment(role: ProviderRole, requested: &ContentTypes) -> f32 {
    let local = matches!(role, ProviderRole::LocalEngine | ProviderRole::SearchablePdf);
    let mut adjustment = 0.0;

    if requested.contains(ContentType::Tables) || requested.contains(ContentType::Formulas) {
        adjustment += match role {
            ProviderRole::DocumentStructure => 0.25,
            _ if local => -0.30,
            _ => 0.0,
        };
    }
    if requested.contains(ContentType::Schematics) {
        adjustment += match role {
            ProviderRole::ImageUnderstanding => 0.30,
            ProviderRole::DocumentStructure => -0.10,
            _ if local => -0.40,
            _ => 0.0,
        };
    }
    adjustment
}

/// Suitability in `[0, 1]`, scaled by the share of requested content types
/// the provider can extract.
pub(super) fn score(descriptor: &ProviderDescriptor, profile: &DocumentProfile, requested: &ContentTypes) -> f32 {
    if requested.is_empty() {
        return 0.0;
    }
    let coverage = descriptor.capabilities.intersection(requested).len() as f32 / requested.len() as f32;
    let raw = base(descriptor.role, profile.kind) + content_adjustment(descriptor.role, requested);
    (raw * coverage).clamp(0.0, 1.0)
}
