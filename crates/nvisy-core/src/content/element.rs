//! Typed content elements.
//!
//! Every element carries a [`Position`] with an absolute page index. Adapters
//! report pages relative to the chunk they were given; the runtime shifts them
//! with [`ContentElement::offset_pages`] before anything is persisted.

use serde::{Deserialize, Serialize};

use super::ContentType;

/// Location of an element: page first, then reading order within the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub page: u32,
    pub order: u32,
}

impl Position {
    pub fn new(page: u32, order: u32) -> Self {
        Self { page, order }
    }
}

/// A recognized word with its engine confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub confidence: f32,
}

impl Word {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A run of recognized text, typically one line or paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub position: Position,
    pub text: String,
    /// Span-level confidence when the engine reports no per-word values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl TextSpan {
    /// Builds a span from words, joining them with single spaces.
    pub fn from_words(position: Position, words: Vec<Word>) -> Self {
        let text = words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            position,
            text,
            confidence: None,
            words,
        }
    }

    /// Builds a span from plain text with an optional span confidence.
    pub fn plain(position: Position, text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            position,
            text: text.into(),
            confidence,
            words: Vec::new(),
        }
    }
}

/// Single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TableCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// A recognized table, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub position: Position,
    pub rows: Vec<Vec<TableCell>>,
}

impl Table {
    /// Most frequent row width. Ties resolve to the wider width.
    pub fn column_count(&self) -> usize {
        let mut counts = std::collections::BTreeMap::<usize, usize>::new();
        for row in &self.rows {
            *counts.entry(row.len()).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|&(width, count)| (count, width))
            .map(|(width, _)| width)
            .unwrap_or(0)
    }

    /// Total number of cells across all rows.
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// A recognized mathematical formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub position: Position,
    /// Structured LaTeX, or free text when the engine could not structure it.
    pub latex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// A symbol detected in a schematic or technical drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchematicSymbol {
    pub id: String,
    pub label: String,
    pub confidence: f32,
}

/// A connection between two symbols, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

/// A recognized schematic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schematic {
    pub position: Position,
    pub symbols: Vec<SchematicSymbol>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Labels of off-page connectors, used to stitch drawings across pages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub off_page_refs: Vec<String>,
}

/// Any recognized element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentElement {
    Text(TextSpan),
    Table(Table),
    Formula(Formula),
    Schematic(Schematic),
}

impl ContentElement {
    /// Returns the element position.
    pub fn position(&self) -> Position {
        match self {
            Self::Text(span) => span.position,
            Self::Table(table) => table.position,
            Self::Formula(formula) => formula.position,
            Self::Schematic(schematic) => schematic.position,
        }
    }

    pub fn position_mut(&mut self) -> &mut Position {
        match self {
            Self::Text(span) => &mut span.position,
            Self::Table(table) => &mut table.position,
            Self::Formula(formula) => &mut formula.position,
            Self::Schematic(schematic) => &mut schematic.position,
        }
    }

    /// Returns the page of the element.
    pub fn page(&self) -> u32 {
        self.position().page
    }

    /// Returns which content type this element belongs to.
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Table(_) => ContentType::Tables,
            Self::Formula(_) => ContentType::Formulas,
            Self::Schematic(_) => ContentType::Schematics,
        }
    }

    /// Shifts the page index by `offset`.
    pub fn offset_pages(mut self, offset: u32) -> Self {
        self.position_mut().page += offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_count_uses_modal_width() {
        let row = |n: usize| (0..n).map(|i| TableCell::new(i.to_string())).collect();
        let table = Table {
            position: Position::default(),
            rows: vec![row(3), row(3), row(2), row(3)],
        };
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.cell_count(), 11);
    }

    #[test]
    fn offset_moves_to_absolute_page() {
        let span = ContentElement::Text(TextSpan::plain(Position::new(2, 0), "x", None));
        assert_eq!(span.offset_pages(5).page(), 7);
    }

    #[test]
    fn serializes_with_type_tag() {
        let formula = ContentElement::Formula(Formula {
            position: Position::new(0, 1),
            latex: r"\frac{a}{b}".into(),
            confidence: Some(0.9),
        });
        let json = serde_json::to_value(&formula).unwrap();
        assert_eq!(json["type"], "formula");
        assert_eq!(json["position"]["order"], 1);
    }
}
