//! The scraped per-norm record ("ficha") as persisted in the parsed cache.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{NormId, RelationKind};

/// A parsed fiche.
///
/// Produced by the HTML extractor, written once to the parsed cache, and
/// immutable afterwards. `id` always equals the id that was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fiche {
    pub id: NormId,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub heading: Option<String>,
    pub summary: Option<String>,
    pub publication: Publication,
    pub relations: FicheRelations,
    pub annexes: Vec<String>,
    pub deep: DeepRecord,
}

impl Fiche {
    /// An empty fiche for `id`; every optional field is null.
    pub fn empty(id: NormId) -> Self {
        Self {
            id,
            title: None,
            excerpt: None,
            heading: None,
            summary: None,
            publication: Publication::default(),
            relations: FicheRelations::default(),
            annexes: Vec::new(),
            deep: DeepRecord::default(),
        }
    }
}

/// Official bulletin (Boletín Oficial) publication info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub date: Option<String>,
    pub number: Option<String>,
}

/// A `(label, url)` pair taken from an anchor. Serialised as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct RelationLink {
    pub label: String,
    pub url: String,
}

impl RelationLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }

    /// The digits of the first `id=<digits>` query parameter in the URL, if any.
    pub fn target_id(&self) -> Option<&str> {
        embedded_ids(&self.url).next()
    }
}

impl From<(String, String)> for RelationLink {
    fn from((label, url): (String, String)) -> Self {
        Self { label, url }
    }
}

impl From<RelationLink> for (String, String) {
    fn from(link: RelationLink) -> Self {
        (link.label, link.url)
    }
}

/// `id=<digits>` as a query parameter: at the start, or after `?`, `&` or
/// `;`, so `norma_id=7` or `pid=7` do not match.
static ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[?&;])id=([0-9]+)").expect("id pattern compiles"));

/// Digit groups of every `id=<digits>` parameter in a URL, in order.
pub fn embedded_ids(url: &str) -> impl Iterator<Item = &str> + '_ {
    ID_PARAM
        .captures_iter(url)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The eight explicit relation lists of a fiche.
///
/// One field per [`RelationKind::EXPLICIT`] kind, so the set of kinds is fixed
/// by the type. Field names are the wire names of the kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FicheRelations {
    pub modifica: Vec<RelationLink>,
    pub es_modificada_por: Vec<RelationLink>,
    pub cita: Vec<RelationLink>,
    pub es_citada_por: Vec<RelationLink>,
    pub complementa: Vec<RelationLink>,
    pub es_complementada_por: Vec<RelationLink>,
    pub reglamenta: Vec<RelationLink>,
    pub es_reglamentada_por: Vec<RelationLink>,
}

impl FicheRelations {
    /// Links listed under `kind`. `Menciona` is never listed explicitly.
    pub fn links(&self, kind: RelationKind) -> &[RelationLink] {
        match kind {
            RelationKind::Modifica => &self.modifica,
            RelationKind::EsModificadaPor => &self.es_modificada_por,
            RelationKind::Cita => &self.cita,
            RelationKind::EsCitadaPor => &self.es_citada_por,
            RelationKind::Complementa => &self.complementa,
            RelationKind::EsComplementadaPor => &self.es_complementada_por,
            RelationKind::Reglamenta => &self.reglamenta,
            RelationKind::EsReglamentadaPor => &self.es_reglamentada_por,
            RelationKind::Menciona => &[],
        }
    }

    /// Mutable access to the list for an explicit kind; `None` for `Menciona`.
    pub fn links_mut(&mut self, kind: RelationKind) -> Option<&mut Vec<RelationLink>> {
        match kind {
            RelationKind::Modifica => Some(&mut self.modifica),
            RelationKind::EsModificadaPor => Some(&mut self.es_modificada_por),
            RelationKind::Cita => Some(&mut self.cita),
            RelationKind::EsCitadaPor => Some(&mut self.es_citada_por),
            RelationKind::Complementa => Some(&mut self.complementa),
            RelationKind::EsComplementadaPor => Some(&mut self.es_complementada_por),
            RelationKind::Reglamenta => Some(&mut self.reglamenta),
            RelationKind::EsReglamentadaPor => Some(&mut self.es_reglamentada_por),
            RelationKind::Menciona => None,
        }
    }

    /// All `(kind, link)` pairs in [`RelationKind::EXPLICIT`] order.
    pub fn iter(&self) -> impl Iterator<Item = (RelationKind, &RelationLink)> {
        RelationKind::EXPLICIT
            .into_iter()
            .flat_map(move |kind| self.links(kind).iter().map(move |link| (kind, link)))
    }
}

/// Deep extraction results over the fiche's full text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepRecord {
    pub full_text: String,
    /// Digit groups of every `id=<digits>` anchor in the document.
    pub mentioned_ids: BTreeSet<String>,
    /// Norm-name phrases found in the running text, e.g. `"Ley 1173"`.
    pub mentioned_texts: Vec<String>,
    pub detailed_annexes: Vec<AnnexEntry>,
    pub observations: Vec<String>,
    pub legal_basis: Vec<String>,
}

impl DeepRecord {
    /// Candidate destination ids from the free-text phrases.
    ///
    /// Takes the last whitespace-delimited token of each phrase. Approximate:
    /// nothing checks that the token names an existing norm, and a norm
    /// number is not the same thing as an `id_norma`.
    pub fn free_text_candidates(&self) -> impl Iterator<Item = &str> {
        self.mentioned_texts
            .iter()
            .filter_map(|phrase| phrase.split_whitespace().last())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnexEntry {
    pub text: String,
    pub url: String,
}

/// Whether a raw and a parsed fiche exist in the cache for a norm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRow {
    pub id: NormId,
    pub raw: bool,
    pub parsed: bool,
}
