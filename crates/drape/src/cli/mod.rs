//! Command handlers and the helpers they share.

pub mod analyze;
pub mod config;
pub mod embed;
pub mod models;
pub mod run;
pub mod serve;

use clap::ValueEnum;
use drape_core::{ClipEncoder, Config, Drape, OutputFormat as CoreOutputFormat};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON document
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// CLI format if given, else the `[output]` config default.
pub fn resolve_format(flag: Option<OutputFormat>, config: &Config) -> CoreOutputFormat {
    match flag {
        Some(format) => format.into(),
        None => CoreOutputFormat::parse(&config.output.format).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown output format {:?} in config, using json",
                config.output.format
            );
            CoreOutputFormat::Json
        }),
    }
}

/// Load the model and encode prompt banks off the async runtime.
pub async fn load_service(config: &Config) -> anyhow::Result<Drape> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || load_service_blocking(&config)).await?
}

/// Load the model, failing early with a hint when files are missing.
pub fn load_service_blocking(config: &Config) -> anyhow::Result<Drape> {
    let model_path = config.model_path();
    let missing = ClipEncoder::missing_files(&model_path);
    if !missing.is_empty() {
        anyhow::bail!(
            "Model files missing from {}: {}\n\n  Hint: Run `drape models download` first.",
            model_path.display(),
            missing
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(Drape::load(config.clone())?)
}

/// Read a request body from a file, or stdin for `-`.
pub fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        Ok(body)
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| anyhow::anyhow!("Cannot read request file {source:?}: {e}"))
    }
}

/// Output file if given, else stdout.
pub fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}
