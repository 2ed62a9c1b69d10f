mod commands;
mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use digesto_core::PipelineConfig;
use digesto_fichas::{FicheResolver, HttpSource};
use digesto_store::{DropboxCredentials, DropboxStore, LocalStore, RemoteStore};
use tracing::Level;

#[derive(Parser)]
#[command(name = "digesto", version, about = "Legal norm relation graph builder")]
struct Cli {
    /// Pipeline config JSON; omitted fields keep their defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use a local directory as the store instead of Dropbox
    #[arg(long, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    #[command(flatten)]
    dropbox: DropboxArgs,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DropboxArgs {
    #[arg(long, env = "APP_KEY", hide_env_values = true)]
    app_key: Option<String>,
    #[arg(long, env = "APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,
    #[arg(long, env = "REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one norm's fiche and print it as JSON
    Ficha { id: String },
    /// Drop both cached tiers of a norm's fiche
    Invalidate { id: String },
    /// Build the consolidated relation graph and publish it
    Build(commands::BuildArgs),
    /// Report which norms have a cached raw and parsed fiche
    Coverage(commands::CoverageArgs),
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn RemoteStore>> {
    if let Some(dir) = &cli.store_dir {
        let store = LocalStore::open(dir)
            .with_context(|| format!("opening store directory {}", dir.display()))?;
        return Ok(Arc::new(store));
    }

    let args = &cli.dropbox;
    let credentials = DropboxCredentials {
        app_key: args.app_key.clone().context("APP_KEY is not set")?,
        app_secret: args.app_secret.clone().context("APP_SECRET is not set")?,
        refresh_token: args
            .refresh_token
            .clone()
            .context("REFRESH_TOKEN is not set")?,
    };
    Ok(Arc::new(DropboxStore::new(credentials)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("digesto v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let store = open_store(&cli)?;
    let source = HttpSource::new(config.document_base_url.clone())
        .context("building HTTP client")?;
    let resolver = FicheResolver::new(store, source, &config);

    match cli.command {
        Command::Ficha { id } => commands::ficha(&resolver, &id).await,
        Command::Invalidate { id } => commands::invalidate(&resolver, &id).await,
        Command::Build(args) => commands::build(resolver, &config, &args).await,
        Command::Coverage(args) => commands::coverage(&resolver, &args).await,
    }
}
