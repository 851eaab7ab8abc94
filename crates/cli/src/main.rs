//! Genius scheduler CLI
//!
//! Inspects the GPU snapshot the scheduler sees, dry-runs placement of a
//! workload and reports daemon health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, rank, snapshot};

#[derive(Parser)]
#[command(name = "genius")]
#[command(author, version, about = "CLI for the Genius GPU-aware scheduler", long_about = None)]
pub struct Cli {
    /// Scheduler API URL
    #[arg(long, env = "GENIUS_API_URL", default_value = "http://localhost:8888")]
    pub api_url: String,

    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the GPUs of every node as currently reported by telemetry
    Snapshot,

    /// Rank nodes for a workload with the given requirement labels
    Rank {
        /// Requirement label, e.g. genius/gpu-number=2 (repeatable)
        #[arg(long = "label", short, value_parser = rank::parse_label)]
        labels: Vec<(String, String)>,

        /// Candidate node (repeatable); defaults to every node in the snapshot
        #[arg(long = "node", short)]
        nodes: Vec<String>,

        /// Workload name shown in scheduler logs
        #[arg(long, default_value = "genius-cli")]
        name: String,
    },

    /// Show scheduler component health
    Health,
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Snapshot => snapshot::show_snapshot(&client, cli.format).await,
        Commands::Rank {
            labels,
            nodes,
            name,
        } => rank::rank_nodes(&client, &name, labels, nodes, cli.format).await,
        Commands::Health => health::show_health(&client, cli.format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
