//! Document inspection and page slicing.
//!
//! Inspection classifies a submitted document without running any provider:
//! it sniffs the container format, counts pages, and decides between
//! born-digital, scanned, and technical PDFs by looking at the operators in
//! each page content stream.
//!
//! Both functions are CPU bound and meant to run on a blocking thread.

use bytes::Bytes;
use lopdf::content::Content;
use nvisy_core::document::{Document, DocumentFormat, DocumentId, DocumentKind, PageRange, TechnicalMarkers};

use crate::error::{RuntimeError, RuntimeResult};

/// Tracing target for document inspection.
pub const TRACING_TARGET: &str = "nvisy_runtime::inspect";

/// Share of pages with a text layer above which a PDF is born-digital.
const TEXT_PAGE_RATIO: f32 = 0.5;

/// Average path operators per page above which a PDF is technical.
const VECTOR_DENSITY_THRESHOLD: f32 = 200.0;

/// Share of math glyphs in the text layer above which a PDF is technical.
const MATH_DENSITY_THRESHOLD: f32 = 0.05;

const TEXT_OPERATORS: &[&str] = &["Tj", "TJ", "'", "\""];
const PATH_OPERATORS: &[&str] = &["m", "l", "c", "v", "y", "h", "re"];

/// Per-page operator counts.
#[derive(Debug, Default, Clone, Copy)]
struct PageOperators {
    text: usize,
    path: usize,
}

/// Inspects `bytes` and returns the document record.
///
/// Fails with [`RuntimeError::UnreadableDocument`] for unknown formats,
/// corrupt or encrypted PDFs, and PDFs without pages.
pub fn inspect(bytes: &[u8], languages: Vec<String>) -> RuntimeResult<Document> {
    let format = DocumentFormat::sniff(bytes)
        .ok_or_else(|| RuntimeError::UnreadableDocument("unrecognized document format".into()))?;
    let id = DocumentId::from_bytes(bytes);

    if format.is_image() {
        return Ok(Document {
            id,
            format,
            kind: DocumentKind::Image,
            page_count: 1,
            byte_size: bytes.len() as u64,
            languages,
            markers: TechnicalMarkers::default(),
        });
    }

    let pdf = load_pdf(bytes)?;
    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(RuntimeError::UnreadableDocument("document has no pages".into()));
    }

    let operators: Vec<PageOperators> = pages
        .values()
        .map(|&page_id| count_operators(&pdf, page_id))
        .collect();
    let page_count = pages.len() as u32;
    let text_pages = operators.iter().filter(|ops| ops.text > 0).count();
    let text_ratio = text_pages as f32 / page_count as f32;

    let page_numbers: Vec<u32> = pages.keys().copied().collect();
    let markers = TechnicalMarkers {
        vector_density: operators.iter().map(|ops| ops.path).sum::<usize>() as f32 / page_count as f32,
        math_glyph_density: if text_pages > 0 {
            math_density(&pdf.extract_text(&page_numbers).unwrap_or_default())
        } else {
            0.0
        },
    };

    let kind = if markers.vector_density >= VECTOR_DENSITY_THRESHOLD
        || markers.math_glyph_density >= MATH_DENSITY_THRESHOLD
    {
        DocumentKind::MixedTechnical
    } else if text_ratio >= TEXT_PAGE_RATIO {
        DocumentKind::BornDigital
    } else {
        DocumentKind::Scanned
    };

    tracing::debug!(
        target: TRACING_TARGET,
        document_id = %id,
        page_count,
        text_ratio,
        vector_density = markers.vector_density,
        math_glyph_density = markers.math_glyph_density,
        kind = %kind,
        "document inspected"
    );

    Ok(Document {
        id,
        format,
        kind,
        page_count,
        byte_size: bytes.len() as u64,
        languages,
        markers,
    })
}

/// Cuts the document into one standalone payload per range.
///
/// Images have a single page and are passed through unchanged. PDF slices
/// keep only the pages of their range and drop unreferenced objects.
pub fn slice(bytes: &Bytes, format: DocumentFormat, ranges: &[PageRange]) -> RuntimeResult<Vec<Bytes>> {
    if format.is_image() {
        return Ok(ranges.iter().map(|_| bytes.clone()).collect());
    }

    let pdf = load_pdf(bytes)?;
    let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();

    ranges
        .iter()
        .map(|range| {
            let mut part = pdf.clone();
            // Page numbers are one-based.
            let outside: Vec<u32> = page_numbers
                .iter()
                .copied()
                .filter(|&number| !range.contains(number - 1))
                .collect();
            part.delete_pages(&outside);
            part.prune_objects();

            let mut out = Vec::new();
            part.save_to(&mut out)
                .map_err(|err| RuntimeError::UnreadableDocument(format!("failed to write pages {range}: {err}")))?;
            Ok(Bytes::from(out))
        })
        .collect()
}

fn load_pdf(bytes: &[u8]) -> RuntimeResult<lopdf::Document> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|err| RuntimeError::UnreadableDocument(format!("failed to parse pdf: {err}")))?;
    if pdf.trailer.get(b"Encrypt").is_ok() {
        return Err(RuntimeError::UnreadableDocument("encrypted pdf".into()));
    }
    Ok(pdf)
}

fn count_operators(pdf: &lopdf::Document, page_id: lopdf::ObjectId) -> PageOperators {
    let Ok(raw) = pdf.get_page_content(page_id) else {
        return PageOperators::default();
    };
    let Ok(content) = Content::decode(&raw) else {
        return PageOperators::default();
    };

    content
        .operations
        .iter()
        .fold(PageOperators::default(), |mut acc, op| {
            let operator = op.operator.as_str();
            if TEXT_OPERATORS.contains(&operator) && shows_text(&op.operands) {
                acc.text += 1;
            } else if PATH_OPERATORS.contains(&operator) {
                acc.path += 1;
            }
            acc
        })
}

fn shows_text(operands: &[lopdf::Object]) -> bool {
    operands.iter().any(|operand| match operand {
        lopdf::Object::String(bytes, _) => bytes.iter().any(|b| !b.is_ascii_whitespace()),
        lopdf::Object::Array(items) => shows_text(items),
        _ => false,
    })
}

fn is_math_glyph(c: char) -> bool {
    matches!(c, '\u{2200}'..='\u{22ff}' | '\u{2a00}'..='\u{2aff}' | '\u{0391}'..='\u{03c9}' | '±' | '×' | '÷')
}

fn math_density(text: &str) -> f32 {
    let (math, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(math, total), c| (math + usize::from(is_math_glyph(c)), total + 1));
    if total == 0 { 0.0 } else { math as f32 / total as f32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Page, pdf};

    #[test]
    fn text_layer_means_born_digital() {
        let bytes = pdf(&[Page::Text("Hello world"), Page::Text("Second page"), Page::Blank]);
        let document = inspect(&bytes, vec!["eng".into()]).unwrap();
        assert_eq!(document.format, DocumentFormat::Pdf);
        assert_eq!(document.kind, DocumentKind::BornDigital);
        assert_eq!(document.page_count, 3);
        assert_eq!(document.languages, ["eng"]);
        assert_eq!(document.id, DocumentId::from_bytes(&bytes));
    }

    #[test]
    fn missing_text_layer_means_scanned() {
        let bytes = pdf(&[Page::Blank, Page::Blank, Page::Text("stamp")]);
        assert_eq!(inspect(&bytes, Vec::new()).unwrap().kind, DocumentKind::Scanned);
    }

    #[test]
    fn dense_vectors_mean_technical() {
        let bytes = pdf(&[Page::Drawing(500), Page::Text("legend")]);
        let document = inspect(&bytes, Vec::new()).unwrap();
        assert_eq!(document.kind, DocumentKind::MixedTechnical);
        assert!(document.markers.vector_density >= VECTOR_DENSITY_THRESHOLD);
    }

    #[test]
    fn images_have_one_page() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        let document = inspect(&png, Vec::new()).unwrap();
        assert_eq!(document.kind, DocumentKind::Image);
        assert_eq!(document.page_count, 1);
    }

    #[test]
    fn corrupt_input_is_unreadable() {
        assert!(matches!(
            inspect(b"%PDF-1.7 truncated", Vec::new()),
            Err(RuntimeError::UnreadableDocument(_))
        ));
        assert!(matches!(
            inspect(b"plain text", Vec::new()),
            Err(RuntimeError::UnreadableDocument(_))
        ));
    }

    #[test]
    fn slices_keep_only_their_pages() {
        let bytes = pdf(&[
            Page::Text("one"),
            Page::Text("two"),
            Page::Text("three"),
            Page::Text("four"),
            Page::Text("five"),
        ]);
        let ranges = [PageRange::new(0, 2), PageRange::new(2, 5)];
        let parts = slice(&bytes, DocumentFormat::Pdf, &ranges).unwrap();
        assert_eq!(parts.len(), 2);

        let first = lopdf::Document::load_mem(&parts[0]).unwrap();
        let second = lopdf::Document::load_mem(&parts[1]).unwrap();
        assert_eq!(first.get_pages().len(), 2);
        assert_eq!(second.get_pages().len(), 3);
    }

    #[test]
    fn math_density_counts_symbols() {
        assert_eq!(math_density(""), 0.0);
        assert!((math_density("a∑b∫") - 0.5).abs() < 1e-6);
    }
}
