//! Terminal output for run results.

use std::collections::BTreeMap;

use arrow::util::pretty::pretty_format_batches;
use digesto_core::{CoverageRow, RelationEdge};
use digesto_store::tabular;

/// Print the first `limit` edges as a table, then per-kind and
/// per-provenance counts over all of them.
pub fn print_edges(edges: &[RelationEdge], limit: usize) -> anyhow::Result<()> {
    if edges.is_empty() {
        println!("(no edges)");
        return Ok(());
    }

    let head = &edges[..edges.len().min(limit)];
    let batch = tabular::edges_to_batch(head)?;
    println!("{}", pretty_format_batches(&[batch])?);
    if edges.len() > head.len() {
        println!("  ... {} more", edges.len() - head.len());
    }

    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_provenance: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in edges {
        *by_kind.entry(edge.kind.as_str()).or_default() += 1;
        *by_provenance.entry(edge.provenance.as_str()).or_default() += 1;
    }

    println!();
    println!("  By kind:");
    for (kind, count) in &by_kind {
        println!("    {kind:<24} {count}");
    }
    println!("  By provenance:");
    for (provenance, count) in &by_provenance {
        println!("    {provenance:<24} {count}");
    }
    println!();
    Ok(())
}

pub fn print_coverage(rows: &[CoverageRow]) {
    let raw = rows.iter().filter(|r| r.raw).count();
    let parsed = rows.iter().filter(|r| r.parsed).count();
    let pct = |n: usize| {
        if rows.is_empty() {
            0.0
        } else {
            100.0 * n as f64 / rows.len() as f64
        }
    };

    println!("norms:            {}", rows.len());
    println!("raw fiche:        {raw} ({:.1}%)", pct(raw));
    println!("parsed fiche:     {parsed} ({:.1}%)", pct(parsed));
    println!(
        "raw, not parsed:  {}",
        rows.iter().filter(|r| r.raw && !r.parsed).count()
    );
}
