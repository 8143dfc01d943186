//! Recognized content: content types and typed elements.

mod element;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub use element::{
    Connection, ContentElement, Formula, Position, Schematic, SchematicSymbol, Table, TableCell,
    TextSpan, Word,
};

/// Kind of content a caller can request and a provider can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Tables,
    Formulas,
    Schematics,
}

/// Ordered set of [`ContentType`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTypes(BTreeSet<ContentType>);

impl ContentTypes {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every content type.
    pub fn all() -> Self {
        ContentType::iter().collect()
    }

    /// Just [`ContentType::Text`].
    pub fn text() -> Self {
        Self::new().with(ContentType::Text)
    }

    /// Adds a content type, builder style.
    pub fn with(mut self, content_type: ContentType) -> Self {
        self.0.insert(content_type);
        self
    }

    pub fn insert(&mut self, content_type: ContentType) -> bool {
        self.0.insert(content_type)
    }

    pub fn contains(&self, content_type: ContentType) -> bool {
        self.0.contains(&content_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ContentType> + '_ {
        self.0.iter().copied()
    }

    /// Content types present in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        self.0.intersection(&other.0).copied().collect()
    }

    /// Returns `true` if every type in `self` is also in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl FromIterator<ContentType> for ContentTypes {
    fn from_iter<I: IntoIterator<Item = ContentType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ContentTypes {
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, ContentType>>;
    type Item = ContentType;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl fmt::Display for ContentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for content_type in self {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(content_type.as_ref())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for ContentTypes {
    type Err = strum::ParseError;

    /// Parses a comma separated list such as `text,tables`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ContentType::from_str)
            .collect()
    }
}
