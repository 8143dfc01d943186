//! Content fixtures with predictable quality.
//!
//! With the default evaluator settings:
//!
//! - [`text_pages`] and [`text_span`] score `0.6 + 0.4 * (1 - low_confidence_ratio)`,
//!   rounded to the nearest 1/20 since each span holds twenty equal words.
//! - [`schematic`] scores `confident / total`.
//! - [`table`] with no empty cells scores `1.0`.

use crate::content::{
    Connection, ContentElement, Formula, Position, Schematic, SchematicSymbol, Table, TableCell,
    TextSpan, Word,
};

/// Words per generated text span.
pub const WORDS_PER_SPAN: usize = 20;

/// Confidence given to confident words and symbols.
pub const HIGH_CONFIDENCE: f32 = 0.95;

/// Confidence given to low confidence words and symbols.
pub const LOW_CONFIDENCE: f32 = 0.2;

const VOCABULARY: [&str; 4] = ["document", "pipeline", "recorded", "accepted"];

/// One span of twenty eight-letter dictionary words on `page`, the first
/// `round(20 * low_confidence_ratio)` of which carry a low confidence.
pub fn text_span(page: u32, order: u32, low_confidence_ratio: f32) -> ContentElement {
    let low = (WORDS_PER_SPAN as f32 * low_confidence_ratio.clamp(0.0, 1.0)).round() as usize;
    let words = (0..WORDS_PER_SPAN)
        .map(|i| {
            let confidence = if i < low { LOW_CONFIDENCE } else { HIGH_CONFIDENCE };
            Word::new(VOCABULARY[i % VOCABULARY.len()], confidence)
        })
        .collect();
    ContentElement::Text(TextSpan::from_words(Position::new(page, order), words))
}

/// One text span per chunk-relative page `0..pages`.
pub fn text_pages(pages: u32, low_confidence_ratio: f32) -> Vec<ContentElement> {
    (0..pages)
        .map(|page| text_span(page, 0, low_confidence_ratio))
        .collect()
}

/// A schematic with `total` symbols of which `confident` clear the floor,
/// chained by connections.
pub fn schematic(page: u32, confident: usize, total: usize) -> ContentElement {
    let symbols: Vec<SchematicSymbol> = (0..total)
        .map(|i| SchematicSymbol {
            id: format!("S{i}"),
            label: format!("R{}", i + 1),
            confidence: if i < confident { HIGH_CONFIDENCE } else { LOW_CONFIDENCE },
        })
        .collect();
    let connections = symbols
        .windows(2)
        .map(|pair| Connection {
            from: pair[0].id.clone(),
            to: pair[1].id.clone(),
        })
        .collect();
    ContentElement::Schematic(Schematic {
        position: Position::new(page, 0),
        symbols,
        connections,
        off_page_refs: Vec::new(),
    })
}

/// A `rows` x `cols` table whose last `empty_cells` cells are blank.
pub fn table(page: u32, order: u32, rows: usize, cols: usize, empty_cells: usize) -> ContentElement {
    let total = rows * cols;
    let rows = (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let index = r * cols + c;
                    if index + empty_cells >= total {
                        TableCell::new("")
                    } else {
                        TableCell::new(format!("r{r}c{c}"))
                    }
                })
                .collect()
        })
        .collect();
    ContentElement::Table(Table {
        position: Position::new(page, order),
        rows,
    })
}

/// A formula element.
pub fn formula(page: u32, order: u32, latex: &str, confidence: f32) -> ContentElement {
    ContentElement::Formula(Formula {
        position: Position::new(page, order),
        latex: latex.to_owned(),
        confidence: Some(confidence),
    })
}
