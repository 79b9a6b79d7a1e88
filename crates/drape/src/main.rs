//! Drape CLI - fashion attribute extraction from product images.
//!
//! Drape classifies product photos against fixed fashion vocabularies with a
//! CLIP model and outputs structured attributes: category, color, pattern,
//! gender, and garment details where the category has them.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a single image or a directory
//! drape analyze shirt.jpg
//! drape analyze ./catalog/ --format jsonl --output attributes.jsonl
//!
//! # Answer one service request
//! drape run request.json
//!
//! # JSONL worker: one batch job per stdin line
//! drape serve < jobs.jsonl
//!
//! # Manage models
//! drape models download
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Drape - fashion attribute extraction from product images.
#[derive(Parser, Debug)]
#[command(name = "drape")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "DRAPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract attributes from an image file or directory
    Analyze(cli::analyze::AnalyzeArgs),

    /// Answer one JSON service request from a file or stdin
    Run(cli::run::RunArgs),

    /// Process batch jobs from stdin as JSON Lines
    Serve(cli::serve::ServeArgs),

    /// Print the embedding of a text or image
    Embed(cli::embed::EmbedArgs),

    /// Manage CLIP models (download, list, etc.)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli.config {
        Some(ref path) => drape_core::Config::load_from(path)
            .map_err(|e| anyhow::anyhow!("Cannot load config {}: {e}", path.display()))?,
        None => match drape_core::Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `drape config path`."
                );
                drape_core::Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Drape v{}", drape_core::VERSION);

    match cli.command {
        Commands::Analyze(args) => cli::analyze::execute(args, &config).await,
        Commands::Run(args) => cli::run::execute(args, &config).await,
        Commands::Serve(args) => cli::serve::execute(args, &config).await,
        Commands::Embed(args) => cli::embed::execute(args, &config).await,
        Commands::Models(args) => cli::models::execute(args, &config).await,
        Commands::Config(args) => {
            cli::config::execute(args, &config, cli.config.as_deref()).await
        }
    }
}
