//! Which norms have a cached raw and/or parsed fiche.

use std::collections::HashSet;

use digesto_core::{CoverageRow, NormId};
use digesto_store::{RemoteStore, StoreError};
use tracing::info;

use crate::resolver::CacheLayout;

async fn cached_ids<S: RemoteStore>(
    store: &S,
    folder: &str,
    parse: fn(&str) -> Option<NormId>,
) -> Result<HashSet<NormId>, StoreError> {
    Ok(store
        .list(folder)
        .await?
        .into_iter()
        .filter(|e| e.is_file())
        .filter_map(|e| parse(&e.name))
        .collect())
}

/// One row per id in `ids`, in order, flagging presence in each cache tier.
///
/// Each tier folder is listed once, so this costs two listings regardless of
/// how many ids are checked.
pub async fn scan_coverage<S: RemoteStore>(
    store: &S,
    layout: &CacheLayout,
    ids: &[NormId],
) -> Result<Vec<CoverageRow>, StoreError> {
    let raw = cached_ids(store, &layout.raw_folder, CacheLayout::raw_id).await?;
    let parsed = cached_ids(store, &layout.parsed_folder, CacheLayout::parsed_id).await?;

    let rows: Vec<CoverageRow> = ids
        .iter()
        .map(|id| CoverageRow {
            id: id.clone(),
            raw: raw.contains(id),
            parsed: parsed.contains(id),
        })
        .collect();
    info!(
        norms = rows.len(),
        raw = rows.iter().filter(|r| r.raw).count(),
        parsed = rows.iter().filter(|r| r.parsed).count(),
        "cache coverage"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use digesto_store::MemoryStore;

    use super::*;

    fn id(raw: &str) -> NormId {
        NormId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn flags_each_tier() {
        let store = MemoryStore::new();
        for path in [
            "/fichas_html/1.html",
            "/fichas_html/2.html",
            "/fichas_json/2.json",
            "/fichas_json/3.json",
            "/fichas_html/notes.txt",
        ] {
            store.put(path, b"x".to_vec()).await.unwrap();
        }

        let rows = scan_coverage(&store, &CacheLayout::default(), &[id("1"), id("2"), id("3"), id("4")])
            .await
            .unwrap();
        let flags: Vec<_> = rows.iter().map(|r| (r.id.as_str(), r.raw, r.parsed)).collect();
        assert_eq!(
            flags,
            vec![
                ("1", true, false),
                ("2", true, true),
                ("3", false, true),
                ("4", false, false),
            ]
        );
    }

    #[tokio::test]
    async fn empty_store_has_no_coverage() {
        let store = MemoryStore::new();
        let rows = scan_coverage(&store, &CacheLayout::default(), &[id("1")])
            .await
            .unwrap();
        assert!(!rows[0].raw && !rows[0].parsed);
    }
}
