//! Heuristic lookup of the column an aggregate question is about.
//!
//! The realized field names are scanned once, in storage order. The first
//! field whose lower-cased name equals the primary keyword or contains any of
//! the substrings wins. When qualifiers are given, a field must also contain
//! one of them.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordSet {
    pub primary: &'static str,
    pub substrings: &'static [&'static str],
    pub qualifiers: &'static [&'static str],
}

impl KeywordSet {
    pub const fn new(primary: &'static str, substrings: &'static [&'static str]) -> Self {
        Self {
            primary,
            substrings,
            qualifiers: &[],
        }
    }

    pub const fn qualified_by(self, qualifiers: &'static [&'static str]) -> Self {
        Self { qualifiers, ..self }
    }

    fn matches(&self, lowered: &str) -> bool {
        let named = lowered == self.primary
            || self.substrings.iter().any(|needle| lowered.contains(needle));
        named
            && (self.qualifiers.is_empty() || self.qualifiers.iter().any(|q| lowered.contains(q)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "field", rename_all = "snake_case")]
pub enum FieldMatch {
    Found(String),
    NotFound,
}

impl FieldMatch {
    pub fn is_found(&self) -> bool {
        matches!(self, FieldMatch::Found(_))
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            FieldMatch::Found(name) => Some(name),
            FieldMatch::NotFound => None,
        }
    }
}

impl fmt::Display for FieldMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMatch::Found(name) => write!(f, "'{name}'"),
            FieldMatch::NotFound => write!(f, "no match"),
        }
    }
}

/// Returns the first stored field name (original casing) that answers `keywords`.
pub fn match_field<S: AsRef<str>>(available: &[S], keywords: &KeywordSet) -> FieldMatch {
    let found = available
        .iter()
        .position(|field| keywords.matches(&field.as_ref().to_lowercase()));

    match found {
        Some(idx) => FieldMatch::Found(available[idx].as_ref().to_string()),
        None => FieldMatch::NotFound,
    }
}
