//! Lumi CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP gateway
//! - `ingest`  Load reference documents into the search index
//! - `config`  Inspect configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "lumi",
    about = "Lumi: parenting-advice chat backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LUMI_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chunk text files and add them to the document index
    Ingest {
        /// Source id stored with every chunk (defaults to each file's stem)
        #[arg(short, long)]
        source: Option<String>,

        /// Text files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ingest { source, files } => commands::ingest::run(source, files).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
