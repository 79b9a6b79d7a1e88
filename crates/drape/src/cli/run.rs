//! The `drape run` command: answer one JSON request the way the service would.

use clap::{Args, ValueEnum};
use drape_core::{
    AnalyzeRequest, BatchRequest, Config, Drape, EmbedBatchRequest, EmbedRequest, OutputFormat,
    OutputWriter,
};
use std::path::PathBuf;

use super::{load_service, open_output, read_input};

/// Which service call a request body is for.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum RequestKind {
    /// `{"input": {"images": [...]}}`
    #[default]
    Batch,
    /// `{"image": "<base64>", "mimeType": "..."}`
    Analyze,
    /// `{"type": "text"|"image", ...}`
    Embed,
    /// `{"images": ["<base64>", ...]}`
    EmbedBatch,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Request JSON file, or `-` for stdin
    #[arg(default_value = "-")]
    pub request: String,

    /// Request type
    #[arg(short, long, value_enum, default_value_t = RequestKind::Batch)]
    pub kind: RequestKind,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let body = read_input(&args.request)?;
    let drape = load_service(config).await?;

    let response = dispatch(&drape, args.kind, &body).await?;

    let pretty = args.pretty || config.output.pretty;
    let mut writer = OutputWriter::new(open_output(args.output.as_deref())?, OutputFormat::Json, pretty);
    writer.write(&response)?;
    writer.flush()?;
    Ok(())
}

/// Parse a request body and run the matching call.
pub async fn dispatch(
    drape: &Drape,
    kind: RequestKind,
    body: &str,
) -> anyhow::Result<serde_json::Value> {
    let parse_err = |e: serde_json::Error| anyhow::anyhow!("Invalid {kind:?} request: {e}");

    let response = match kind {
        RequestKind::Batch => {
            let request: BatchRequest = serde_json::from_str(body).map_err(parse_err)?;
            serde_json::to_value(drape.analyze_batch(&request).await)?
        }
        RequestKind::Analyze => {
            let request: AnalyzeRequest = serde_json::from_str(body).map_err(parse_err)?;
            serde_json::to_value(drape.analyze_image(&request).await)?
        }
        RequestKind::Embed => {
            let request: EmbedRequest = serde_json::from_str(body).map_err(parse_err)?;
            serde_json::to_value(drape.embed(&request).await)?
        }
        RequestKind::EmbedBatch => {
            let request: EmbedBatchRequest = serde_json::from_str(body).map_err(parse_err)?;
            serde_json::to_value(drape.embed_batch(&request).await)?
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::serve::tests::test_service;

    #[tokio::test]
    async fn test_dispatch_batch_rejects_empty() {
        let drape = test_service();
        let response = dispatch(&drape, RequestKind::Batch, r#"{"input": {"images": []}}"#)
            .await
            .unwrap();
        assert_eq!(response["error"], "No images provided");
        assert_eq!(response["results"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_dispatch_analyze_without_image() {
        let drape = test_service();
        let response = dispatch(&drape, RequestKind::Analyze, "{}").await.unwrap();
        assert_eq!(response["success"], false);
        assert_eq!(response["error"], "No image data provided");
    }

    #[tokio::test]
    async fn test_dispatch_embed_text() {
        let drape = test_service();
        let response = dispatch(
            &drape,
            RequestKind::Embed,
            r#"{"type": "text", "text": "navy blazer"}"#,
        )
        .await
        .unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["dimensions"], 2);
    }

    #[tokio::test]
    async fn test_dispatch_invalid_json() {
        let drape = test_service();
        let err = dispatch(&drape, RequestKind::EmbedBatch, "not json")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid EmbedBatch request"));
    }
}
