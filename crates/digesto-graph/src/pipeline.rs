//! The batch run: resolve every norm's fiche, fold everything into the edge
//! set, and publish the tables.
//!
//! Ids are processed one at a time. A fiche that cannot be fetched or parsed
//! only costs that id; a store failure aborts the run, which can simply be
//! restarted since every fetched and parsed fiche is already cached.

use std::fmt;

use digesto_core::{CoverageRow, NormId, OfficialRelation, PipelineConfig, RelationEdge};
use digesto_fichas::{CacheLayout, DocumentSource, FicheResolver, ResolveError, scan_coverage};
use digesto_store::tabular::{self, TableError};
use digesto_store::{RemoteStore, StoreError, join_path};
use thiserror::Error;
use tracing::{debug, info};

use crate::consolidate::{ConsolidationStats, EdgeAccumulator};

/// Consolidated edges, relative to the output folder.
pub const EDGES_FILE: &str = "digesto_relaciones_expandido.csv";

/// Cache coverage per norm, relative to the output folder.
pub const COVERAGE_FILE: &str = "digesto_cobertura_fichas.csv";

const PROGRESS_EVERY: usize = 100;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// What a run did, in counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub ids_processed: usize,
    pub fiches_found: usize,
    pub edges: usize,
    pub dropped_missing_endpoint: usize,
    pub dropped_unknown_kind: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ids processed:            {}", self.ids_processed)?;
        writeln!(f, "fiches found:             {}", self.fiches_found)?;
        writeln!(f, "edges:                    {}", self.edges)?;
        writeln!(f, "dropped (missing id):     {}", self.dropped_missing_endpoint)?;
        write!(f, "dropped (unknown kind):   {}", self.dropped_unknown_kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub edges: Vec<RelationEdge>,
    pub coverage: Vec<CoverageRow>,
    pub stats: ConsolidationStats,
    pub report: RunReport,
}

pub struct Pipeline<S, D> {
    resolver: FicheResolver<S, D>,
    output_folder: String,
}

impl<S: RemoteStore, D: DocumentSource> Pipeline<S, D> {
    pub fn new(resolver: FicheResolver<S, D>, config: &PipelineConfig) -> Self {
        Self {
            resolver,
            output_folder: config.output_folder.clone(),
        }
    }

    pub fn resolver(&self) -> &FicheResolver<S, D> {
        &self.resolver
    }

    /// Ids of every norm with a parsed fiche in the cache, in listing order.
    pub async fn cached_ids(&self) -> Result<Vec<NormId>, StoreError> {
        let folder = &self.resolver.layout().parsed_folder;
        Ok(self
            .resolver
            .store()
            .list(folder)
            .await?
            .into_iter()
            .filter(|e| e.is_file())
            .filter_map(|e| CacheLayout::parsed_id(&e.name))
            .collect())
    }

    /// Resolve each id in order and consolidate its fiche together with the
    /// official rows.
    pub async fn run(
        &self,
        official: &[OfficialRelation],
        ids: &[NormId],
    ) -> Result<RunOutput, PipelineError> {
        info!(official = official.len(), ids = ids.len(), "starting consolidation run");
        let mut acc = EdgeAccumulator::new();
        acc.add_official(official);

        let mut fiches_found = 0;
        for (n, id) in ids.iter().enumerate() {
            match self.resolver.resolve(id).await? {
                Some(fiche) => {
                    fiches_found += 1;
                    acc.add_fiche(&fiche);
                }
                None => debug!(%id, "no fiche"),
            }
            if (n + 1) % PROGRESS_EVERY == 0 {
                info!(done = n + 1, total = ids.len(), edges = acc.len(), "progress");
            }
        }

        let coverage = scan_coverage(self.resolver.store(), self.resolver.layout(), ids).await?;
        let consolidation = acc.finish();
        let stats = consolidation.stats;
        let report = RunReport {
            ids_processed: ids.len(),
            fiches_found,
            edges: consolidation.edges.len(),
            dropped_missing_endpoint: stats.dropped_missing_endpoint,
            dropped_unknown_kind: stats.dropped_unknown_kind,
        };
        info!(
            edges = report.edges,
            fiches = report.fiches_found,
            %stats,
            resolver = ?self.resolver.stats(),
            "consolidation finished"
        );

        Ok(RunOutput {
            edges: consolidation.edges,
            coverage,
            stats,
            report,
        })
    }

    /// Write the edge and coverage tables to the output folder, replacing any
    /// previous copies. Returns the store paths written.
    pub async fn publish(&self, output: &RunOutput) -> Result<Vec<String>, PipelineError> {
        let edges_path = join_path(&self.output_folder, EDGES_FILE);
        self.replace(&edges_path, tabular::edges_to_csv(&output.edges)?)
            .await?;

        let coverage_path = join_path(&self.output_folder, COVERAGE_FILE);
        self.replace(&coverage_path, tabular::coverage_to_csv(&output.coverage)?)
            .await?;

        Ok(vec![edges_path, coverage_path])
    }

    /// Delete, then upload.
    async fn replace(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let store = self.resolver.store();
        store.delete(path).await?;
        let len = bytes.len();
        store.put(path, bytes).await?;
        info!(path, bytes = len, "published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use digesto_core::{Provenance, RelationKind, RetryPolicy};
    use digesto_fichas::FetchError;
    use digesto_store::MemoryStore;

    use super::*;

    /// Serves fixed pages by id; any other id fails.
    struct Pages(HashMap<String, String>);

    #[async_trait]
    impl DocumentSource for Pages {
        async fn fetch(&self, id: &NormId) -> Result<String, FetchError> {
            self.0
                .get(id.as_str())
                .cloned()
                .ok_or(FetchError::Status { status: 404 })
        }
    }

    fn id(raw: &str) -> NormId {
        NormId::parse(raw).unwrap()
    }

    fn pipeline(store: Arc<MemoryStore>) -> Pipeline<Arc<MemoryStore>, Pages> {
        let config = PipelineConfig {
            retry: RetryPolicy::immediate(2),
            ..PipelineConfig::default()
        };
        let pages = Pages(HashMap::from([
            (
                "5".to_string(),
                r#"<div id="Textos_Completos"><p>ENERGÍA</p>
                   <p>Esta norma modifica a <a href="verNorma.do?id=10">la ley</a></p></div>"#
                    .to_string(),
            ),
            ("6".to_string(), "<html>mantenimiento</html>".to_string()),
        ]));
        Pipeline::new(FicheResolver::new(store, pages, &config), &config)
    }

    fn official() -> Vec<OfficialRelation> {
        vec![
            OfficialRelation {
                origin: Some("5.0".into()),
                destination: Some("10.0".into()),
                kind: Some("modifica".into()),
            },
            OfficialRelation {
                origin: Some("nan".into()),
                destination: Some("10".into()),
                kind: Some("modifica".into()),
            },
            OfficialRelation {
                origin: Some("1".into()),
                destination: Some("2".into()),
                kind: Some("deroga".into()),
            },
        ]
    }

    #[tokio::test]
    async fn run_reports_counts_and_isolates_failures() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());
        let ids = [id("5"), id("6"), id("7")];

        let out = pipeline.run(&official(), &ids).await.unwrap();

        assert_eq!(
            out.report,
            RunReport {
                ids_processed: 3,
                fiches_found: 1,
                edges: 3,
                dropped_missing_endpoint: 1,
                dropped_unknown_kind: 1,
            }
        );
        let kinds: Vec<_> = out.edges.iter().map(|e| (e.kind, e.provenance)).collect();
        assert_eq!(
            kinds,
            vec![
                (RelationKind::Modifica, Provenance::OfficialTable),
                (RelationKind::Modifica, Provenance::FichaExplicit),
                (RelationKind::Menciona, Provenance::EmbeddedLink),
            ]
        );

        let coverage: Vec<_> = out.coverage.iter().map(|r| (r.raw, r.parsed)).collect();
        assert_eq!(coverage, vec![(true, true), (true, false), (false, false)]);
    }

    #[tokio::test]
    async fn publish_replaces_previous_tables() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("/data_procesada/digesto_relaciones_expandido.csv", b"stale".to_vec())
            .await
            .unwrap();
        let pipeline = pipeline(store.clone());
        let out = pipeline.run(&official(), &[id("5")]).await.unwrap();

        let paths = pipeline.publish(&out).await.unwrap();
        assert_eq!(
            paths,
            vec![
                "/data_procesada/digesto_relaciones_expandido.csv",
                "/data_procesada/digesto_cobertura_fichas.csv",
            ]
        );
        let edges = store
            .get("/data_procesada/digesto_relaciones_expandido.csv")
            .await
            .unwrap()
            .unwrap();
        let edges = String::from_utf8(edges).unwrap();
        assert!(edges.starts_with("origin_id,destination_id,relation_kind,provenance\n"));
        assert!(edges.contains("5,10,modifica,official_table"));
        assert!(edges.contains("5,10,modifica,ficha_explicit"));
    }

    #[tokio::test]
    async fn cached_ids_come_from_parsed_tier() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());
        pipeline.run(&[], &[id("5"), id("6")]).await.unwrap();

        assert_eq!(pipeline.cached_ids().await.unwrap(), vec![id("5")]);
    }
}
