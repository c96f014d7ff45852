//! CLI entry point for estate-classify.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use futures_util::TryStreamExt;
use tracing_subscriber::{fmt, EnvFilter};

use estate_classify::journal::record_classification;
use estate_classify::{
    BlobSample, ClassificationEngine, ClassificationReport, ClassificationRun, ClassificationTables,
};
use estate_core::{EstateConfig, NodeKey, Severity};
use estate_graph::{GraphStore, NodeRecord, SchemaRegistry};

/// Bytes of a file read for a blob sample.
const BLOB_SAMPLE_BYTES: u64 = 64 * 1024;

#[derive(Parser)]
#[command(name = "estate-classify")]
#[command(about = "Classify columns and files of the estate metadata graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: estate).
    #[arg(short, long, default_value = "estate", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Classify every stored column from its name and sample values.
    Columns,
    /// Classify a local file sample.
    Blob {
        /// File to sample.
        file: PathBuf,
        /// Blob node to link findings to, as `Blob:<container>/<path>`.
        #[arg(long)]
        asset: Option<NodeKey>,
    },
    /// Totals of stored classifications.
    Report {
        /// Also list classifications at or above this severity.
        #[arg(long)]
        min_severity: Option<Severity>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EstateConfig::load(&cli.config)?;
    let tables = ClassificationTables::standard()?.with_config(&config.classify)?;
    let engine = ClassificationEngine::new(Arc::new(tables));
    let store = GraphStore::open(&config.store, SchemaRegistry::standard()).await?;

    match cli.command {
        Command::Columns => {
            let run = ClassificationRun::new(store.clone(), engine);
            let summary = run.classify_columns(Utc::now()).await?;
            record_classification("columns", &summary, &config.ingest.journal_dir);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Blob { file, asset } => {
            let sample = read_sample(&file, asset.as_ref())?;
            let outcome = match asset {
                Some(asset) => {
                    let run = ClassificationRun::new(store.clone(), engine);
                    run.classify_blob(&asset, &sample, Utc::now()).await?
                }
                None => engine.classify_blob(&sample),
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Report { min_severity } => {
            let report = ClassificationReport::from_store(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(min) = min_severity {
                let nodes: Vec<NodeRecord> =
                    store.classifications_at_least(min).try_collect().await?;
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            }
        }
    }

    store.close().await;
    Ok(())
}

fn read_sample(file: &Path, asset: Option<&NodeKey>) -> anyhow::Result<BlobSample> {
    let mut bytes = Vec::new();
    std::fs::File::open(file)?
        .take(BLOB_SAMPLE_BYTES)
        .read_to_end(&mut bytes)?;

    let path = match asset {
        Some(asset) => asset.key.clone(),
        None => file.display().to_string(),
    };
    Ok(BlobSample {
        path,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    })
}
