//! Fixtures shared by unit tests.

use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};

/// Content of one generated PDF page.
pub(crate) enum Page {
    Text(&'static str),
    Blank,
    Drawing(usize),
}

pub(crate) fn pdf(pages: &[Page]) -> Bytes {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let operations = match page {
            Page::Text(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            Page::Blank => vec![],
            Page::Drawing(segments) => (0..*segments)
                .map(|i| Operation::new("l", vec![(i as i64).into(), 10.into()]))
                .collect(),
        };
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    Bytes::from(out)
}

/// A PDF of `pages` pages without a text layer.
pub(crate) fn scanned_pdf(pages: usize) -> Bytes {
    let pages: Vec<Page> = (0..pages).map(|_| Page::Blank).collect();
    pdf(&pages)
}
