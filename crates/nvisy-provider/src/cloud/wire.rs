//! JSON contract shared by the cloud recognition services.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nvisy_core::content::{
    Connection, ContentElement, ContentType, ContentTypes, Formula, Position, Schematic,
    SchematicSymbol, Table, TableCell, TextSpan, Word,
};
use nvisy_core::provider::RecognizeRequest;
use serde::{Deserialize, Serialize};

/// Request body of `POST <base>/<endpoint>`.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeBody {
    /// Base64 encoded chunk payload.
    pub document: String,
    pub mime_type: &'static str,
    pub page_count: u32,
    pub content_types: ContentTypes,
    pub preset: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl RecognizeBody {
    pub fn from_request(request: &RecognizeRequest) -> Self {
        Self {
            document: STANDARD.encode(&request.chunk),
            mime_type: request.format.mime_type(),
            page_count: request.pages.len(),
            content_types: request.content_types.clone(),
            preset: request.configuration.preset.clone(),
            languages: request.configuration.languages.clone(),
            params: request.configuration.params.clone(),
        }
    }
}

/// Response body of a successful call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub elements: Vec<WireElement>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireWord {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCell {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSymbol {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireConnection {
    pub from: String,
    pub to: String,
}

/// One element as returned by a service, pages relative to the chunk.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireElement {
    Text {
        page: u32,
        #[serde(default)]
        order: u32,
        #[serde(default)]
        text: String,
        #[serde(default)]
        confidence: Option<f32>,
        #[serde(default)]
        words: Vec<WireWord>,
    },
    Table {
        page: u32,
        #[serde(default)]
        order: u32,
        rows: Vec<Vec<WireCell>>,
    },
    Formula {
        page: u32,
        #[serde(default)]
        order: u32,
        latex: String,
        #[serde(default)]
        confidence: Option<f32>,
    },
    Schematic {
        page: u32,
        #[serde(default)]
        order: u32,
        symbols: Vec<WireSymbol>,
        #[serde(default)]
        connections: Vec<WireConnection>,
        #[serde(default)]
        off_page_refs: Vec<String>,
    },
}

impl WireElement {
    pub fn page(&self) -> u32 {
        match self {
            Self::Text { page, .. }
            | Self::Table { page, .. }
            | Self::Formula { page, .. }
            | Self::Schematic { page, .. } => *page,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text { .. } => ContentType::Text,
            Self::Table { .. } => ContentType::Tables,
            Self::Formula { .. } => ContentType::Formulas,
            Self::Schematic { .. } => ContentType::Schematics,
        }
    }
}

fn unit(confidence: Option<f32>) -> Option<f32> {
    confidence.map(|c| c.clamp(0.0, 1.0))
}

impl From<WireElement> for ContentElement {
    fn from(element: WireElement) -> Self {
        match element {
            WireElement::Text {
                page,
                order,
                text,
                confidence,
                words,
            } => {
                let words: Vec<Word> = words
                    .into_iter()
                    .map(|w| Word::new(w.text, unit(w.confidence).unwrap_or(1.0)))
                    .collect();
                let mut span = if words.is_empty() {
                    TextSpan::plain(Position::new(page, order), text, None)
                } else {
                    TextSpan::from_words(Position::new(page, order), words)
                };
                span.confidence = unit(confidence);
                Self::Text(span)
            }
            WireElement::Table { page, order, rows } => Self::Table(Table {
                position: Position::new(page, order),
                rows: rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|cell| TableCell {
                                text: cell.text,
                                confidence: unit(cell.confidence),
                            })
                            .collect()
                    })
                    .collect(),
            }),
            WireElement::Formula {
                page,
                order,
                latex,
                confidence,
            } => Self::Formula(Formula {
                position: Position::new(page, order),
                latex,
                confidence: unit(confidence),
            }),
            WireElement::Schematic {
                page,
                order,
                symbols,
                connections,
                off_page_refs,
            } => Self::Schematic(Schematic {
                position: Position::new(page, order),
                symbols: symbols
                    .into_iter()
                    .map(|s| SchematicSymbol {
                        id: s.id,
                        label: s.label,
                        confidence: unit(s.confidence).unwrap_or(0.0),
                    })
                    .collect(),
                connections: connections
                    .into_iter()
                    .map(|c| Connection {
                        from: c.from,
                        to: c.to,
                    })
                    .collect(),
                off_page_refs,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_elements() {
        let json = r#"{
            "language": "eng",
            "elements": [
                {"type": "text", "page": 0, "text": "Total", "confidence": 1.4},
                {"type": "table", "page": 1, "order": 2, "rows": [[{"text": "a"}, {"text": ""}]]},
                {"type": "schematic", "page": 0, "symbols": [{"id": "R1", "confidence": 0.8}],
                 "connections": [], "off_page_refs": ["A"]}
            ]
        }"#;
        let response: RecognizeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.language.as_deref(), Some("eng"));
        assert_eq!(response.elements.len(), 3);

        let elements: Vec<ContentElement> =
            response.elements.into_iter().map(Into::into).collect();
        let ContentElement::Text(span) = &elements[0] else {
            panic!("expected text");
        };
        assert_eq!(span.confidence, Some(1.0));
        assert_eq!(elements[1].position(), Position::new(1, 2));
        let ContentElement::Schematic(schematic) = &elements[2] else {
            panic!("expected schematic");
        };
        assert_eq!(schematic.off_page_refs, ["A"]);
    }
}
