use std::fmt;

use serde::{Serialize, Serializer};

/// A value scraped from the portal, or the reason it could not be.
///
/// `Missing` carries the placeholder text shown wherever the value would
/// have been rendered ("No status found", "No budget found", ...). Storage
/// and JSON output see `None`/`null` instead of the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    Found(T),
    Missing(&'static str),
}

impl<T> Extracted<T> {
    /// `Found(value)` for `Some`, `Missing(placeholder)` for `None`.
    pub fn from_option(value: Option<T>, placeholder: &'static str) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::Missing(placeholder),
        }
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            Self::Found(v) => Some(v),
            Self::Missing(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl Extracted<String> {
    /// Trimmed text, treating an empty string as missing.
    pub fn text(raw: Option<&str>, placeholder: &'static str) -> Self {
        match raw.map(str::trim) {
            Some(t) if !t.is_empty() => Self::Found(t.to_string()),
            _ => Self::Missing(placeholder),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Extracted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(v) => v.fmt(f),
            Self::Missing(placeholder) => f.write_str(placeholder),
        }
    }
}

impl<T: Serialize> Serialize for Extracted<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Found(v) => serializer.serialize_some(v),
            Self::Missing(_) => serializer.serialize_none(),
        }
    }
}
