//! CLI entry point for estate-lineage. Results are JSON on stdout, logs go
//! to stderr.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use estate_core::{EstateConfig, NodeKey};
use estate_graph::{GraphStore, SchemaRegistry};
use estate_lineage::LineageEngine;

#[derive(Parser)]
#[command(name = "estate-lineage")]
#[command(about = "Lineage queries over the estate metadata graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: estate).
    #[arg(short, long, default_value = "estate", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Lineage path between two assets, given as `Label:key`.
    Path {
        #[arg(long)]
        from: NodeKey,
        #[arg(long)]
        to: NodeKey,
        /// List every path instead of the shortest.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
        #[arg(long, default_value_t = 100)]
        max_paths: usize,
    },
    /// Assets downstream of an asset.
    Impact {
        #[arg(long)]
        from: NodeKey,
        #[arg(long, default_value_t = 5)]
        max_hops: usize,
    },
    /// Assets upstream of an asset.
    Sources {
        #[arg(long)]
        to: NodeKey,
        #[arg(long, default_value_t = 5)]
        max_hops: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = EstateConfig::load(&cli.config)?;
    let store = GraphStore::open(&config.store, SchemaRegistry::standard()).await?;
    let engine = LineageEngine::new(store.clone());

    match cli.command {
        Command::Path {
            ref from,
            ref to,
            all,
            max_depth,
            max_paths,
        } => {
            if all {
                let paths = engine.enumerate_paths(from, to, max_depth, max_paths).await?;
                println!("{}", serde_json::to_string(&paths)?);
            } else {
                let path = engine.shortest_path(from, to).await?;
                println!("{}", serde_json::to_string(&path)?);
            }
        }
        Command::Impact { ref from, max_hops } => {
            let impact = engine.downstream_impact(from, max_hops).await?;
            println!("{}", serde_json::to_string(&impact)?);
        }
        Command::Sources { ref to, max_hops } => {
            let sources = engine.upstream_sources(to, max_hops).await?;
            println!("{}", serde_json::to_string(&sources)?);
        }
    }

    store.close().await;
    Ok(())
}
