//! Turning a fiche page into a [`Fiche`].
//!
//! Field rules, all relative to the `#Textos_Completos` container unless
//! noted:
//!
//! * title: first paragraph
//! * excerpt: first `span.destacado`
//! * heading: first `h1`
//! * summary: the paragraph following the last bold "Resumen" label
//! * publication: the last anchor pointing at the official bulletin
//! * annexes: anchors (whole document) pointing at annex or attachment files
//! * relations: every paragraph in the document is classified by its trigger
//!   phrases, and each of its anchors is appended to every matching kind
//! * deep record: full text, every `id=` anchor, free-text norm mentions,
//!   observations and the legal-basis paragraphs
//!
//! Link URLs are resolved against the page URL.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use digesto_core::{
    AnnexEntry, DeepRecord, Fiche, NormId, Publication, RelationKind, RelationLink, embedded_ids,
};
use regex::Regex;
use url::Url;

use crate::html::{Document, NodeId, clean};

/// `id` of the element wrapping the fiche body.
pub const CONTAINER_ID: &str = "Textos_Completos";

/// Substring identifying official bulletin links.
pub const BULLETIN_MARKER: &str = "page_id=216";

/// Substrings identifying annex links.
pub const ANNEX_MARKERS: &[&str] = &["anexos", "adjuntos"];

/// Trigger phrases and the kind each one signals. Matched case-insensitively
/// as substrings of the paragraph text.
pub const TRIGGERS: &[(&str, RelationKind)] = &[
    ("modifica a", RelationKind::Modifica),
    ("modificada por", RelationKind::EsModificadaPor),
    ("complementa a", RelationKind::Complementa),
    ("complementada por", RelationKind::EsComplementadaPor),
    ("reglamenta a", RelationKind::Reglamenta),
    ("reglamentada por", RelationKind::EsReglamentadaPor),
    ("cita a", RelationKind::Cita),
    ("citada por", RelationKind::EsCitadaPor),
];

/// Bulletin dates: `03-ene-2017`, `12/05/1999`, `1.2.03`.
static BULLETIN_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9]{1,2}[-/.](?:[0-9]{1,2}|\p{L}{3,10})[-/.][0-9]{2,4}\b")
        .expect("date pattern compiles")
});

/// Bulletin issue number after `Número:`, `Nro.` or `N°`.
static BULLETIN_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:n[úu]mero|nro\.?|n[°º])\s*:?\s*([0-9]+)")
        .expect("number pattern compiles")
});

/// Norm-name phrases: type, optional number marker, and a number made of
/// digits with `.`, `/` or `-` separators.
static NORM_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(ley|decreto|resoluci[oó]n|disposici[oó]n|acordada|circular|",
        r"comunicaci[oó]n|decisi[oó]n\s+administrativa)",
        r"\s+(?:(n[°º]|nro\.?|no\.|n[úu]mero)\s*)?",
        r"([0-9](?:[0-9./-]*[0-9])?)\b",
    ))
    .expect("mention pattern compiles")
});

/// Maps a paragraph's text to the relation kinds it announces.
pub type Classifier = fn(&str) -> BTreeSet<RelationKind>;

/// The default trigger-phrase classifier.
pub fn classify(text: &str) -> BTreeSet<RelationKind> {
    let lower = text.to_lowercase();
    TRIGGERS
        .iter()
        .filter(|(phrase, _)| lower.contains(phrase))
        .map(|(_, kind)| *kind)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Extractor {
    base_url: String,
    classifier: Classifier,
}

impl Extractor {
    /// `base_url` is the document URL prefix; relative hrefs are resolved
    /// against it.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            classifier: classify,
        }
    }

    /// Swap the paragraph classifier.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Extract the fiche for `id` from its page. `None` when the page has no
    /// fiche container.
    pub fn extract(&self, id: &NormId, html: &str) -> Option<Fiche> {
        let doc = Document::parse(html);
        let container = doc.find_with_attr(Document::ROOT, "div", "id", CONTAINER_ID)?;
        let page_url = Url::parse(&format!("{}{}", self.base_url, id)).ok();
        let page_url = page_url.as_ref();

        let mut fiche = Fiche::empty(id.clone());
        fiche.title = doc.find(container, "p").and_then(|p| clean(&doc.text(p)));
        fiche.excerpt = doc
            .find_with_class(container, "span", "destacado")
            .and_then(|s| clean(&doc.text(s)));
        fiche.heading = doc.find(container, "h1").and_then(|h| clean(&doc.text(h)));
        fiche.summary = labelled_paragraph(&doc, container, "resumen").last();
        fiche.publication = doc
            .find_all(container, "a")
            .into_iter()
            .filter(|a| doc.attr(*a, "href").is_some_and(|h| h.contains(BULLETIN_MARKER)))
            .last()
            .and_then(|a| clean(&doc.text(a)))
            .map(|text| parse_publication(&text))
            .unwrap_or_default();

        let annexes = annex_entries(&doc, page_url);
        fiche.annexes = annexes.iter().map(|a| a.url.clone()).collect();

        for p in doc.find_all(Document::ROOT, "p") {
            let kinds = (self.classifier)(&doc.text_joined(p, " "));
            if kinds.is_empty() {
                continue;
            }
            for a in doc.find_all(p, "a") {
                let Some(href) = doc.attr(a, "href") else {
                    continue;
                };
                let link = RelationLink::new(
                    clean(&doc.text(a)).unwrap_or_default(),
                    absolute(page_url, href),
                );
                for kind in &kinds {
                    if let Some(list) = fiche.relations.links_mut(*kind) {
                        list.push(link.clone());
                    }
                }
            }
        }

        fiche.deep = deep_record(&doc, container, page_url, annexes);
        Some(fiche)
    }
}

/// `href` made absolute against the page URL. Left as written when it does
/// not parse.
fn absolute(page_url: Option<&Url>, href: &str) -> String {
    let href = href.trim();
    page_url
        .map_or_else(|| Url::parse(href), |base| base.join(href))
        .map_or_else(|_| href.to_string(), String::from)
}

fn deep_record(
    doc: &Document,
    container: NodeId,
    page_url: Option<&Url>,
    annexes: Vec<AnnexEntry>,
) -> DeepRecord {
    let paragraphs: Vec<String> = doc
        .find_all(container, "p")
        .into_iter()
        .filter_map(|p| clean(&doc.text(p)))
        .collect();
    let full_text = paragraphs.join("\n");

    let mut mentioned_ids = BTreeSet::new();
    for href in doc
        .find_all(Document::ROOT, "a")
        .into_iter()
        .filter_map(|a| doc.attr(a, "href"))
    {
        let url = absolute(page_url, href);
        mentioned_ids.extend(embedded_ids(&url).map(str::to_string));
    }

    let legal_basis = paragraphs
        .iter()
        .filter(|p| {
            let lower = p.to_lowercase();
            lower.starts_with("visto") || lower.contains("en uso de las facultades")
        })
        .cloned()
        .collect();

    DeepRecord {
        mentioned_texts: norm_mentions(&full_text),
        full_text,
        mentioned_ids,
        detailed_annexes: annexes,
        observations: labelled_paragraph(doc, container, "observaci").collect(),
        legal_basis,
    }
}

/// Text of the paragraph following each bold label containing `label`.
fn labelled_paragraph<'a>(
    doc: &'a Document,
    container: NodeId,
    label: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let mut labels = doc.find_all(container, "strong");
    labels.extend(doc.find_all(container, "b"));
    labels.sort();
    labels
        .into_iter()
        .filter(move |l| doc.text(*l).to_lowercase().contains(label))
        .filter_map(move |l| doc.find_next(l, "p"))
        .filter_map(move |p| clean(&doc.text(p)))
}

fn annex_entries(doc: &Document, page_url: Option<&Url>) -> Vec<AnnexEntry> {
    doc.find_all(Document::ROOT, "a")
        .into_iter()
        .filter_map(|a| {
            let href = doc.attr(a, "href")?;
            let lower = href.to_lowercase();
            ANNEX_MARKERS.iter().any(|m| lower.contains(m)).then(|| AnnexEntry {
                text: clean(&doc.text(a)).unwrap_or_default(),
                url: absolute(page_url, href),
            })
        })
        .collect()
}

/// Split bulletin link text such as `"03-ene-2017 Número: 33541 Página: 3"`
/// into date and number. When neither is recognisable the whole text goes
/// in both fields.
pub fn parse_publication(text: &str) -> Publication {
    let date = BULLETIN_DATE.find(text).map(|m| m.as_str().to_string());
    let number = BULLETIN_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    if date.is_none() && number.is_none() {
        return Publication {
            date: Some(text.to_string()),
            number: Some(text.to_string()),
        };
    }
    Publication { date, number }
}

/// Find norm-name phrases like `"Ley 1173"`, `"Decreto N° 50/2019"` or
/// `"Decisión Administrativa 12"` in running text. Each distinct phrase is
/// reported once, in order of first appearance.
pub fn norm_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    NORM_MENTION
        .captures_iter(text)
        .map(|caps| {
            let mut words: Vec<&str> = caps[1].split_whitespace().collect();
            words.extend(caps.get(2).map(|m| m.as_str()));
            words.push(&caps[3]);
            words.join(" ")
        })
        .filter(|phrase| seen.insert(phrase.clone()))
        .collect()
}
