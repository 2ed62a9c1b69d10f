//! Relation kinds, provenance channels, and graph edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::NormId;

/// Typed edge category between two norms.
///
/// Eight explicit legal relations (four symmetric pairs) plus a generic
/// mention used by the embedded-link and free-text channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Modifica,
    EsModificadaPor,
    Cita,
    EsCitadaPor,
    Complementa,
    EsComplementadaPor,
    Reglamenta,
    EsReglamentadaPor,
    Menciona,
}

impl RelationKind {
    /// The eight kinds a fiche can list explicitly, in display order.
    pub const EXPLICIT: [RelationKind; 8] = [
        Self::Modifica,
        Self::EsModificadaPor,
        Self::Cita,
        Self::EsCitadaPor,
        Self::Complementa,
        Self::EsComplementadaPor,
        Self::Reglamenta,
        Self::EsReglamentadaPor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modifica => "modifica",
            Self::EsModificadaPor => "es_modificada_por",
            Self::Cita => "cita",
            Self::EsCitadaPor => "es_citada_por",
            Self::Complementa => "complementa",
            Self::EsComplementadaPor => "es_complementada_por",
            Self::Reglamenta => "reglamenta",
            Self::EsReglamentadaPor => "es_reglamentada_por",
            Self::Menciona => "menciona",
        }
    }

    /// The reverse direction of an explicit relation. `Menciona` is its own inverse.
    pub fn inverse(&self) -> Self {
        match self {
            Self::Modifica => Self::EsModificadaPor,
            Self::EsModificadaPor => Self::Modifica,
            Self::Cita => Self::EsCitadaPor,
            Self::EsCitadaPor => Self::Cita,
            Self::Complementa => Self::EsComplementadaPor,
            Self::EsComplementadaPor => Self::Complementa,
            Self::Reglamenta => Self::EsReglamentadaPor,
            Self::EsReglamentadaPor => Self::Reglamenta,
            Self::Menciona => Self::Menciona,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown relation kind: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for RelationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::EXPLICIT
            .iter()
            .chain(std::iter::once(&Self::Menciona))
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// The source channel that produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The official modificatorias/modificadas export.
    OfficialTable,
    /// A fiche's explicit relation lists.
    FichaExplicit,
    /// An `id=<digits>` anchor anywhere in a fiche document.
    EmbeddedLink,
    /// A norm-name phrase found in a fiche's running text.
    FreeText,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficialTable => "official_table",
            Self::FichaExplicit => "ficha_explicit",
            Self::EmbeddedLink => "embedded_link",
            Self::FreeText => "free_text",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the consolidated graph.
///
/// Equality and hashing cover the full `(origin, destination, kind, provenance)`
/// tuple: the same structural edge seen through two channels is two edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    pub origin: NormId,
    pub destination: NormId,
    pub kind: RelationKind,
    pub provenance: Provenance,
}

/// A row of the official relation table, as read.
///
/// Cells are kept raw; ids are normalised only when the row becomes an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficialRelation {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub kind: Option<String>,
}

/// A `(modifying, modified)` pair from the official modifications export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationPair {
    pub modifying: Option<String>,
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in RelationKind::EXPLICIT
            .iter()
            .chain(std::iter::once(&RelationKind::Menciona))
        {
            assert_eq!(kind.as_str().parse::<RelationKind>(), Ok(*kind));
        }
    }

    #[test]
    fn kind_parse_is_lenient_on_case_and_padding() {
        assert_eq!(" Modifica ".parse(), Ok(RelationKind::Modifica));
        assert!("deroga".parse::<RelationKind>().is_err());
    }

    #[test]
    fn inverse_pairs() {
        for kind in RelationKind::EXPLICIT {
            assert_ne!(kind.inverse(), kind);
            assert_eq!(kind.inverse().inverse(), kind);
        }
        assert_eq!(RelationKind::Menciona.inverse(), RelationKind::Menciona);
    }

    #[test]
    fn serde_names_match_wire_format() {
        assert_eq!(
            serde_json::to_string(&RelationKind::EsReglamentadaPor).unwrap(),
            "\"es_reglamentada_por\""
        );
        assert_eq!(
            serde_json::to_string(&Provenance::EmbeddedLink).unwrap(),
            "\"embedded_link\""
        );
    }

    #[test]
    fn edges_differing_only_in_provenance_are_distinct() {
        let a = RelationEdge {
            origin: NormId::parse("5").unwrap(),
            destination: NormId::parse("10").unwrap(),
            kind: RelationKind::Menciona,
            provenance: Provenance::EmbeddedLink,
        };
        let b = RelationEdge {
            provenance: Provenance::FreeText,
            ..a.clone()
        };
        assert_ne!(a, b);
    }
}
