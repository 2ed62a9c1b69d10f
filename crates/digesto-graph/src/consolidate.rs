//! Folding every relation source into one deduplicated edge set.
//!
//! Edges are emitted with raw endpoints, normalised, dropped when an endpoint
//! is missing, and deduplicated on the full `(origin, destination, kind,
//! provenance)` key. The same structural edge found through two provenances
//! is kept twice.

use std::collections::HashSet;
use std::fmt;

use digesto_core::{
    Fiche, ModificationPair, NormId, OfficialRelation, Provenance, RelationEdge, RelationKind,
};
use tracing::debug;

/// Official relation rows from `(modifying, modified)` pairs: a `modifica`
/// row in the modifying→modified direction and an `es_modificada_por` row in
/// the other.
pub fn derive_official_relations(pairs: &[ModificationPair]) -> Vec<OfficialRelation> {
    let kind = RelationKind::Modifica;
    let forward = pairs.iter().map(|p| OfficialRelation {
        origin: p.modifying.clone(),
        destination: p.modified.clone(),
        kind: Some(kind.as_str().to_string()),
    });
    let backward = pairs.iter().map(|p| OfficialRelation {
        origin: p.modified.clone(),
        destination: p.modifying.clone(),
        kind: Some(kind.inverse().as_str().to_string()),
    });
    forward.chain(backward).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub official_rows: usize,
    pub fiches: usize,
    /// Edges emitted before normalisation and deduplication.
    pub emitted: usize,
    pub dropped_missing_endpoint: usize,
    pub dropped_unknown_kind: usize,
    pub duplicates: usize,
}

impl fmt::Display for ConsolidationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} emitted, {} duplicates, {} missing endpoint, {} unknown kind",
            self.emitted, self.duplicates, self.dropped_missing_endpoint, self.dropped_unknown_kind
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    /// Unique edges in first-seen order.
    pub edges: Vec<RelationEdge>,
    pub stats: ConsolidationStats,
}

/// Append-only edge accumulator.
#[derive(Debug, Default)]
pub struct EdgeAccumulator {
    edges: Vec<RelationEdge>,
    seen: HashSet<RelationEdge>,
    stats: ConsolidationStats,
}

impl EdgeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn stats(&self) -> &ConsolidationStats {
        &self.stats
    }

    /// Normalise both endpoints and keep the edge unless it is incomplete or
    /// already present.
    fn push(
        &mut self,
        origin: Option<&str>,
        destination: Option<&str>,
        kind: RelationKind,
        provenance: Provenance,
    ) {
        self.stats.emitted += 1;
        let origin = origin.and_then(NormId::parse);
        let destination = destination.and_then(NormId::parse);
        let (Some(origin), Some(destination)) = (origin, destination) else {
            self.stats.dropped_missing_endpoint += 1;
            return;
        };

        let edge = RelationEdge {
            origin,
            destination,
            kind,
            provenance,
        };
        if self.seen.insert(edge.clone()) {
            self.edges.push(edge);
        } else {
            self.stats.duplicates += 1;
        }
    }

    /// Add official relation rows. Rows whose kind is missing or not one of
    /// the nine known kinds are counted and skipped.
    pub fn add_official(&mut self, rows: &[OfficialRelation]) {
        for row in rows {
            self.stats.official_rows += 1;
            let kind = row.kind.as_deref().map(str::parse::<RelationKind>);
            match kind {
                Some(Ok(kind)) => self.push(
                    row.origin.as_deref(),
                    row.destination.as_deref(),
                    kind,
                    Provenance::OfficialTable,
                ),
                _ => {
                    debug!(kind = ?row.kind, "official row with unknown relation kind");
                    self.stats.dropped_unknown_kind += 1;
                }
            }
        }
    }

    /// Add every edge a fiche evidences: its explicit relation lists, its
    /// embedded `id=` links and its free-text mentions.
    pub fn add_fiche(&mut self, fiche: &Fiche) {
        self.stats.fiches += 1;
        let origin = Some(fiche.id.as_str());

        for (kind, link) in fiche.relations.iter() {
            self.push(origin, link.target_id(), kind, Provenance::FichaExplicit);
        }
        for id in &fiche.deep.mentioned_ids {
            self.push(origin, Some(id.as_str()), RelationKind::Menciona, Provenance::EmbeddedLink);
        }
        for candidate in fiche.deep.free_text_candidates() {
            self.push(origin, Some(candidate), RelationKind::Menciona, Provenance::FreeText);
        }
    }

    pub fn finish(self) -> Consolidation {
        Consolidation {
            edges: self.edges,
            stats: self.stats,
        }
    }
}

/// Consolidate the official table and a set of fiches in one call.
pub fn consolidate<'a>(
    official: &[OfficialRelation],
    fiches: impl IntoIterator<Item = &'a Fiche>,
) -> Consolidation {
    let mut acc = EdgeAccumulator::new();
    acc.add_official(official);
    for fiche in fiches {
        acc.add_fiche(fiche);
    }
    acc.finish()
}
