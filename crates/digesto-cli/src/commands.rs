//! Subcommand implementations.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use digesto_core::{NormId, OfficialRelation, PipelineConfig};
use digesto_fichas::{FicheResolver, HttpSource, scan_coverage};
use digesto_graph::{Pipeline, derive_official_relations};
use digesto_store::{RemoteStore, tabular};

use crate::display;

type Resolver = FicheResolver<Arc<dyn RemoteStore>, HttpSource>;

const PREVIEW_ROWS: usize = 20;

#[derive(Args)]
pub struct BuildArgs {
    /// Official relation table (origin_id, destination_id, relation_kind)
    #[arg(long, value_name = "CSV")]
    relations: Option<PathBuf>,

    /// Official modifications export (id_norma_modificatoria, id_norma_modificada)
    #[arg(long, value_name = "CSV")]
    modifications: Option<PathBuf>,

    /// Norms master table; its id_norma column lists the fiches to resolve.
    /// Without it, every norm with a parsed fiche in the cache is used
    #[arg(long, value_name = "CSV")]
    norms: Option<PathBuf>,

    /// Resolve at most this many norms
    #[arg(long)]
    limit: Option<usize>,

    /// Also write the consolidated edges to a local CSV
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Also write the consolidated edges to a local Parquet file
    #[arg(long, value_name = "PATH")]
    parquet: Option<PathBuf>,

    /// Do not upload the tables to the store's output folder
    #[arg(long)]
    no_publish: bool,
}

#[derive(Args)]
pub struct CoverageArgs {
    /// Norms master table (id_norma column)
    #[arg(long, value_name = "CSV")]
    norms: PathBuf,

    /// Write the coverage table to a local CSV
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

fn parse_id(raw: &str) -> anyhow::Result<NormId> {
    NormId::parse(raw).with_context(|| format!("{raw:?} is not a norm id"))
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

/// Normalised, deduplicated ids from the norms table, in table order.
fn read_norm_ids(path: &Path) -> anyhow::Result<Vec<NormId>> {
    let raw = tabular::read_norm_ids(open(path)?)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut seen = HashSet::new();
    let ids: Vec<NormId> = raw
        .iter()
        .filter_map(NormId::parse)
        .filter(|id| seen.insert(id.clone()))
        .collect();
    tracing::info!(rows = raw.len(), ids = ids.len(), "read norms table");
    Ok(ids)
}

pub async fn ficha(resolver: &Resolver, raw_id: &str) -> anyhow::Result<()> {
    let id = parse_id(raw_id)?;
    match resolver.resolve(&id).await? {
        Some(fiche) => {
            println!("{}", serde_json::to_string_pretty(&fiche)?);
            Ok(())
        }
        None => bail!("no fiche available for norm {id}"),
    }
}

pub async fn invalidate(resolver: &Resolver, raw_id: &str) -> anyhow::Result<()> {
    let id = parse_id(raw_id)?;
    resolver.invalidate(&id).await?;
    eprintln!("Invalidated cached fiche for {id}");
    Ok(())
}

pub async fn build(
    resolver: Resolver,
    config: &PipelineConfig,
    args: &BuildArgs,
) -> anyhow::Result<()> {
    let mut official: Vec<OfficialRelation> = Vec::new();
    if let Some(path) = &args.relations {
        official.extend(
            tabular::read_official_relations(open(path)?)
                .with_context(|| format!("reading {}", path.display()))?,
        );
    }
    if let Some(path) = &args.modifications {
        let pairs = tabular::read_modifications(open(path)?)
            .with_context(|| format!("reading {}", path.display()))?;
        official.extend(derive_official_relations(&pairs));
    }
    if official.is_empty() {
        tracing::warn!("no official relations given; graph comes from fiches only");
    }

    let pipeline = Pipeline::new(resolver, config);
    let mut ids = match &args.norms {
        Some(path) => read_norm_ids(path)?,
        None => pipeline.cached_ids().await.context("listing cached fiches")?,
    };
    if let Some(limit) = args.limit {
        ids.truncate(limit);
    }

    let output = pipeline.run(&official, &ids).await?;

    if !args.no_publish {
        for path in pipeline.publish(&output).await? {
            eprintln!("Published {path}");
        }
    }
    if let Some(path) = &args.out {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        tabular::write_csv(file, &tabular::edges_to_batch(&output.edges)?)?;
        eprintln!("Wrote {}", path.display());
    }
    if let Some(path) = &args.parquet {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        tabular::write_edges_parquet(file, &output.edges)?;
        eprintln!("Wrote {}", path.display());
    }

    display::print_edges(&output.edges, PREVIEW_ROWS)?;
    println!("{}", output.report);
    Ok(())
}

pub async fn coverage(resolver: &Resolver, args: &CoverageArgs) -> anyhow::Result<()> {
    let ids = read_norm_ids(&args.norms)?;
    let rows = scan_coverage(resolver.store(), resolver.layout(), &ids)
        .await
        .context("listing fiche cache")?;

    if let Some(path) = &args.out {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        tabular::write_csv(file, &tabular::coverage_to_batch(&rows)?)?;
        eprintln!("Wrote {}", path.display());
    }
    display::print_coverage(&rows);
    Ok(())
}
