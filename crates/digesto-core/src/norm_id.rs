//! Canonical norm identifiers.
//!
//! The official spreadsheet export, the scraped fiche URLs, and the free-text
//! heuristics all encode the same `id_norma` differently: `"594.0"` from a
//! float column, `" 594 "` from a padded cell, `"594"` from a `verNorma.do?id=`
//! link. Every id is funnelled through [`normalize_id`] before it reaches the
//! graph so that one logical norm maps to exactly one node.
//!
//! # Rules
//!
//! 1. Trim surrounding whitespace.
//! 2. Strip a trailing `.0` (repeated, re-trimming each time).
//! 3. Empty, `nan`, `none`, and `0` (case-insensitive) are missing values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tokens that spreadsheet exports use for an empty id cell.
const MISSING_TOKENS: &[&str] = &["", "nan", "none", "0"];

/// A norm identifier that has passed [`normalize_id`].
///
/// The only constructor is [`NormId::parse`], so holding a `NormId` is proof
/// the value is canonical. Deserialisation goes through the same path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormId(String);

impl NormId {
    /// Normalise `raw` into a canonical id, or `None` if it is a missing value.
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        normalize_id(raw.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NormId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NormId::parse(&value).ok_or_else(|| format!("not a valid norm id: {value:?}"))
    }
}

impl From<NormId> for String {
    fn from(id: NormId) -> Self {
        id.0
    }
}

/// Normalise a raw id string.
///
/// Input: `"594.0"`, `"  594 "`, `"594"`, `"nan"`
/// Output: `Some("594")`, `Some("594")`, `Some("594")`, `None`
///
/// Idempotent: a returned value normalises to itself.
pub fn normalize_id(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    while let Some(stripped) = s.strip_suffix(".0") {
        s = stripped.trim();
    }

    if is_missing_token(s) {
        return None;
    }
    Some(s.to_string())
}

fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_float_suffix() {
        assert_eq!(normalize_id("594.0").as_deref(), Some("594"));
        assert_eq!(normalize_id("283855.0").as_deref(), Some("283855"));
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize_id("  594 ").as_deref(), Some("594"));
        assert_eq!(normalize_id("\t594.0 \n").as_deref(), Some("594"));
    }

    #[test]
    fn missing_values() {
        assert_eq!(normalize_id(""), None);
        assert_eq!(normalize_id("   "), None);
        assert_eq!(normalize_id("nan"), None);
        assert_eq!(normalize_id("NaN"), None);
        assert_eq!(normalize_id("None"), None);
        assert_eq!(normalize_id("0"), None);
        assert_eq!(normalize_id("0.0"), None);
        assert_eq!(normalize_id(".0"), None);
    }

    #[test]
    fn interior_dots_are_kept() {
        // Argentine law numbers use dots as thousands separators.
        assert_eq!(normalize_id("24.240").as_deref(), Some("24.240"));
        assert_eq!(normalize_id("10.05").as_deref(), Some("10.05"));
    }

    #[test]
    fn norm_id_serde_goes_through_normalizer() {
        let id: NormId = serde_json::from_str("\"594.0\"").unwrap();
        assert_eq!(id.as_str(), "594");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"594\"");
        assert!(serde_json::from_str::<NormId>("\"nan\"").is_err());
    }
}
