//! The `drape models` command for managing the CLIP model files.

use clap::{Args, Subcommand};
use drape_core::embedding::{TEXT_MODEL_FILENAME, TOKENIZER_FILENAME, VISUAL_MODEL_FILENAME};
use drape_core::Config;
use std::path::Path;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the CLIP vision encoder, text encoder and tokenizer
    Download {
        /// Hugging Face repository with an `onnx/` export
        #[arg(long, default_value = DEFAULT_REPO)]
        repo: String,

        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// List installed model files
    List,

    /// Show model directory path
    Path,
}

const DEFAULT_REPO: &str = "Xenova/clip-vit-base-patch32";

/// Remote path and local filename of each model file.
const MODEL_FILES: &[(&str, &str)] = &[
    ("onnx/vision_model.onnx", VISUAL_MODEL_FILENAME),
    ("onnx/text_model.onnx", TEXT_MODEL_FILENAME),
    ("tokenizer.json", TOKENIZER_FILENAME),
];

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: &Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Download { repo, force } => {
            let model_path = config.model_path();
            std::fs::create_dir_all(&model_path)?;
            let client = reqwest::Client::new();

            for (remote, local) in MODEL_FILES {
                let dest = model_path.join(local);
                if dest.exists() && !force {
                    tracing::info!("{local} already exists at {:?}", dest);
                    continue;
                }

                let url = download_url(&repo, remote);
                tracing::info!("Downloading {local}...");
                tracing::info!("  Source: {}", url);
                tracing::info!("  Destination: {:?}", dest);

                download_file(&client, &url, &dest).await?;

                let file_size = std::fs::metadata(&dest)?.len();
                tracing::info!(
                    "  {local} complete ({:.1} MB)",
                    file_size as f64 / (1024.0 * 1024.0)
                );
            }

            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_path = config.model_path();

            if !model_path.exists() {
                println!("No models installed.");
                println!("Run `drape models download` to download required models.");
                return Ok(());
            }

            println!("Model: {}", config.model.name);
            println!("  Directory: {}\n", model_path.display());
            for (_, local) in MODEL_FILES {
                let path = model_path.join(local);
                let status = match std::fs::metadata(&path) {
                    Ok(meta) => format!("ready ({:.1} MB)", meta.len() as f64 / (1024.0 * 1024.0)),
                    Err(_) => "not installed".to_string(),
                };
                println!("    - {:20} {}", local, status);
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_path().display());
        }
    }

    Ok(())
}

fn download_url(repo: &str, remote: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/main/{remote}")
}

/// Stream a URL to `dest` through a `.part` file, renamed once complete.
///
/// A body shorter than the advertised `Content-Length` is discarded.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    let pb = create_progress_bar(total_size);

    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().await?;
    drop(file);
    pb.finish_and_clear();

    if let Err(e) = verify_size(downloaded, total_size) {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

fn verify_size(downloaded: u64, expected: Option<u64>) -> anyhow::Result<()> {
    match expected {
        Some(expected) if expected != downloaded => anyhow::bail!(
            "Incomplete download: got {downloaded} of {expected} bytes. Try downloading again."
        ),
        _ => Ok(()),
    }
}

fn create_progress_bar(total: Option<u64>) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-");
            pb.set_style(style);
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url() {
        assert_eq!(
            download_url(DEFAULT_REPO, "onnx/text_model.onnx"),
            "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/text_model.onnx"
        );
    }

    #[test]
    fn test_default_model_dir_matches_default_repo() {
        let repo_name = DEFAULT_REPO.rsplit('/').next().unwrap();
        assert_eq!(Config::default().model.name, repo_name);
    }

    #[test]
    fn test_model_files_match_loader() {
        let locals: Vec<&str> = MODEL_FILES.iter().map(|(_, local)| *local).collect();
        for name in drape_core::embedding::MODEL_FILES {
            assert!(locals.contains(name), "{name} is never downloaded");
        }
    }

    #[test]
    fn test_verify_size() {
        assert!(verify_size(10, Some(10)).is_ok());
        assert!(verify_size(10, None).is_ok());

        let err = verify_size(4, Some(10)).unwrap_err();
        assert!(err.to_string().contains("Incomplete download"));
    }
}
