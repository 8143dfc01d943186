//! Document records and page ranges.
//!
//! A [`Document`] is the immutable description of an ingested input. The
//! bytes themselves live in the durable store under
//! [`DocumentId::storage_key`]; the record only carries what inspection
//! learned about them.

use std::fmt;
use std::ops::Range;

use derive_more::{AsRef, Display};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display as StrumDisplay, EnumString, IntoStaticStr};

/// Content-addressed document identifier: the lowercase hex SHA-256 of the
/// source bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(AsRef, Display)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Key prefix under which source bytes are stored.
    pub const STORAGE_PREFIX: &'static str = "documents/";

    /// Derives the identifier from the document bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Wraps an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the durable store key for the source bytes.
    pub fn storage_key(&self) -> String {
        format!("{}{}", Self::STORAGE_PREFIX, self.0)
    }

    /// Returns the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Container format, detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Bmp,
    Webp,
}

impl DocumentFormat {
    /// Detects the format from leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'%', b'P', b'D', b'F', b'-', ..] => Some(Self::Pdf),
            [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, ..] => Some(Self::Png),
            [0xff, 0xd8, 0xff, ..] => Some(Self::Jpeg),
            [b'I', b'I', 0x2a, 0x00, ..] | [b'M', b'M', 0x00, 0x2a, ..] => Some(Self::Tiff),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    /// Returns the MIME type for the format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
        }
    }

    /// Returns the conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            other => other.into(),
        }
    }

    /// Returns `true` for raster image formats.
    pub fn is_image(self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// Broad classification of how a document was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// PDF with an extractable text layer.
    BornDigital,
    /// PDF made of page images without a usable text layer.
    Scanned,
    /// A single raster image.
    Image,
    /// PDF dense in vector drawings or math glyphs.
    MixedTechnical,
}

/// Signals used to recognize technical documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalMarkers {
    /// Average path-construction operators per page.
    pub vector_density: f32,
    /// Share of extracted characters that are math symbols.
    pub math_glyph_density: f32,
}

/// Half-open range of absolute, zero-based page indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRange {
    /// First page, inclusive.
    pub start: u32,
    /// Last page, exclusive.
    pub end: u32,
}

impl PageRange {
    /// Creates a new range. `end` is clamped to be at least `start`.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of pages covered.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns `true` if the range covers no page.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `page` lies within the range.
    pub fn contains(&self, page: u32) -> bool {
        (self.start..self.end).contains(&page)
    }

    /// Iterates the absolute page indices.
    pub fn pages(&self) -> Range<u32> {
        self.start..self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Immutable record of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content address of the source bytes.
    pub id: DocumentId,
    /// Detected container format.
    pub format: DocumentFormat,
    /// Detected production kind.
    pub kind: DocumentKind,
    /// Number of pages. Images count as one page.
    pub page_count: u32,
    /// Size of the source in bytes.
    pub byte_size: u64,
    /// Declared languages, ISO 639-2 codes.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Technical markers measured during inspection.
    #[serde(default)]
    pub markers: TechnicalMarkers,
}

impl Document {
    /// Returns the full page range of the document.
    pub fn pages(&self) -> PageRange {
        PageRange::new(0, self.page_count)
    }

    /// Returns the profile used for strategy selection.
    pub fn profile(&self) -> DocumentProfile {
        DocumentProfile {
            kind: self.kind,
            format: self.format,
            page_count: self.page_count,
            byte_size: self.byte_size,
            languages: self.languages.clone(),
            markers: self.markers,
        }
    }
}

/// Document features the strategy selector looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProfile {
    pub kind: DocumentKind,
    pub format: DocumentFormat,
    pub page_count: u32,
    pub byte_size: u64,
    pub languages: Vec<String>,
    pub markers: TechnicalMarkers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(DocumentFormat::sniff(b"%PDF-1.7\n"), Some(DocumentFormat::Pdf));
        assert_eq!(
            DocumentFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0]),
            Some(DocumentFormat::Png)
        );
        assert_eq!(DocumentFormat::sniff(&[0xff, 0xd8, 0xff, 0xe0]), Some(DocumentFormat::Jpeg));
        assert_eq!(DocumentFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(DocumentFormat::Webp));
        assert_eq!(DocumentFormat::sniff(b"hello"), None);
        assert_eq!(DocumentFormat::sniff(b""), None);
    }

    #[test]
    fn document_id_is_content_addressed() {
        let a = DocumentId::from_bytes(b"same bytes");
        let b = DocumentId::from_bytes(b"same bytes");
        let c = DocumentId::from_bytes(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.storage_key().starts_with("documents/"));
    }

    #[test]
    fn page_range_bounds() {
        let range = PageRange::new(5, 10);
        assert_eq!(range.len(), 5);
        assert!(range.contains(5));
        assert!(!range.contains(10));
        assert!(PageRange::new(3, 1).is_empty());
        assert_eq!(range.to_string(), "5..10");
    }
}
