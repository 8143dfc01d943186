//! Schematic heuristic.

use nvisy_core::content::{ContentType, Schematic};
use nvisy_core::quality::{FlagReason, Region, RegionFlag};

use super::TypeScore;

pub(super) fn score<'a>(
    schematics: impl Iterator<Item = &'a Schematic>,
    floor: f32,
    threshold: f32,
) -> TypeScore {
    let mut values = Vec::new();
    let mut flags = Vec::new();

    for schematic in schematics {
        let region = Region::element(schematic.position.page, schematic.position.order);
        let total = schematic.symbols.len();
        let confident = schematic
            .symbols
            .iter()
            .filter(|symbol| symbol.confidence >= floor)
            .count();

        let mut value = if total == 0 {
            0.0
        } else {
            confident as f32 / total as f32
        };
        if value < threshold {
            flags.push(RegionFlag::new(region, ContentType::Schematics, FlagReason::LowConfidenceSymbols));
        }
        if total > 1 && schematic.connections.is_empty() {
            value *= 0.5;
            flags.push(RegionFlag::new(region, ContentType::Schematics, FlagReason::MissingConnections));
        }
        values.push(value);
    }

    TypeScore::mean(&values, flags)
}

#[cfg(test)]
mod tests {
    use nvisy_core::content::{ContentElement, Position, SchematicSymbol};
    use nvisy_core::mock::fixtures;

    use super::*;

    fn unwrap(element: ContentElement) -> Schematic {
        match element {
            ContentElement::Schematic(schematic) => schematic,
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn ratio_of_confident_symbols() {
        let schematic = unwrap(fixtures::schematic(0, 3, 4));
        let scored = score(std::iter::once(&schematic), 0.5, 0.6);
        assert!((scored.value - 0.75).abs() < 1e-6);
        assert!(scored.flags.is_empty());
    }

    #[test]
    fn unconnected_components_are_halved() {
        let mut schematic = unwrap(fixtures::schematic(0, 4, 4));
        schematic.connections.clear();
        let scored = score(std::iter::once(&schematic), 0.5, 0.6);
        assert!((scored.value - 0.5).abs() < 1e-6);
        assert_eq!(scored.flags[0].reason, FlagReason::MissingConnections);
    }

    #[test]
    fn single_symbol_needs_no_connection() {
        let schematic = Schematic {
            position: Position::new(0, 0),
            symbols: vec![SchematicSymbol {
                id: "S0".into(),
                label: "GND".into(),
                confidence: 0.9,
            }],
            connections: Vec::new(),
            off_page_refs: Vec::new(),
        };
        let scored = score(std::iter::once(&schematic), 0.5, 0.6);
        assert!((scored.value - 1.0).abs() < 1e-6);
    }
}
