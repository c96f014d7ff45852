//! CLI entry point for estate-ingest.

use std::path::{Path, PathBuf};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use estate_core::{CollectorBatch, EstateConfig};
use estate_graph::{GraphStore, SchemaRegistry};
use estate_ingest::journal::record_ingestion;
use estate_ingest::{IngestError, IngestionCoordinator};

#[derive(Parser)]
#[command(name = "estate-ingest")]
#[command(about = "Ingest collector batches into the estate metadata graph")]
struct Cli {
    /// Collector batch file (JSON). Repeat for several batches.
    #[arg(short, long = "batch", required = true)]
    batches: Vec<PathBuf>,

    /// Config file prefix (default: estate).
    #[arg(short, long, default_value = "estate")]
    config: String,

    /// Print per-kind graph statistics after ingestion.
    #[arg(long)]
    stats: bool,
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

    let batches = cli
        .batches
        .iter()
        .map(|path| load_batch(path))
        .collect::<Result<Vec<_>, _>>()?;

    let store = GraphStore::open(&config.store, SchemaRegistry::standard()).await?;
    let coordinator = IngestionCoordinator::new(store.clone(), config.ingest.clone()).on_chunk(|p| {
        tracing::debug!(
            batch_id = %p.batch_id,
            chunk = p.chunk_index,
            of = p.chunks_total,
            committed = p.committed,
            "Chunk settled"
        );
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current chunk");
            on_signal.cancel();
        }
    });

    let mut summaries = Vec::new();
    let mut failed_tasks = 0;
    for result in coordinator.ingest_all(batches, &cancel).await {
        match result {
            Ok(summary) => {
                record_ingestion(&summary, &config.ingest.journal_dir);
                summaries.push(summary);
            }
            Err(_) => failed_tasks += 1,
        }
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);

    if cli.stats {
        let stats = store.stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    store.close().await;
    if failed_tasks > 0 {
        anyhow::bail!("{failed_tasks} batch task(s) failed");
    }
    Ok(())
}

fn load_batch(path: &Path) -> Result<CollectorBatch, IngestError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| IngestError::BatchFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
