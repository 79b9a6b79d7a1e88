//! The `drape embed` command: print the joint-space embedding of a text or image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Args;
use drape_core::{Config, EmbedKind, EmbedRequest, OutputFormat, OutputWriter};
use std::path::PathBuf;

use super::{load_service, open_output};

/// Arguments for the `embed` command.
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["text", "image"])))]
pub struct EmbedArgs {
    /// Text to embed
    #[arg(short, long)]
    pub text: Option<String>,

    /// Image file to embed
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Execute the embed command.
pub async fn execute(args: EmbedArgs, config: &Config) -> anyhow::Result<()> {
    let request = build_request(&args)?;
    let drape = load_service(config).await?;

    let response = drape.embed(&request).await;
    if let Some(ref error) = response.error {
        tracing::warn!("Embedding failed: {error}");
    }

    let pretty = args.pretty || config.output.pretty;
    let mut writer = OutputWriter::new(
        open_output(args.output.as_deref())?,
        OutputFormat::Json,
        pretty,
    );
    writer.write(&response)?;
    writer.flush()?;
    Ok(())
}

fn build_request(args: &EmbedArgs) -> anyhow::Result<EmbedRequest> {
    if let Some(ref text) = args.text {
        return Ok(EmbedRequest {
            kind: EmbedKind::Text,
            text: Some(text.clone()),
            image: None,
        });
    }

    let path = args
        .image
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Either --text or --image is required"))?;
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Cannot read image {}: {e}", path.display()))?;

    Ok(EmbedRequest {
        kind: EmbedKind::Image,
        text: None,
        image: Some(STANDARD.encode(bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(text: Option<&str>, image: Option<PathBuf>) -> EmbedArgs {
        EmbedArgs {
            text: text.map(str::to_string),
            image,
            output: None,
            pretty: false,
        }
    }

    #[test]
    fn test_text_request() {
        let request = build_request(&args(Some("linen shirt"), None)).unwrap();
        assert_eq!(request.kind, EmbedKind::Text);
        assert_eq!(request.text.as_deref(), Some("linen shirt"));
    }

    #[test]
    fn test_image_request_is_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.bin");
        std::fs::write(&path, b"hello").unwrap();

        let request = build_request(&args(None, Some(path))).unwrap();
        assert_eq!(request.kind, EmbedKind::Image);
        assert_eq!(request.image.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_missing_image_file() {
        let err = build_request(&args(None, Some(PathBuf::from("/nonexistent/a.jpg"))))
            .unwrap_err();
        assert!(err.to_string().contains("Cannot read image"));
    }
}
