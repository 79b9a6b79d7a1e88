//! Drape Core - fashion attribute extraction from product images.
//!
//! Drape classifies product photos against fixed fashion vocabularies with a
//! CLIP-style vision-language model and returns structured attributes:
//! category, color, pattern and gender for every image, plus sleeve length,
//! neckline and garment length when the category has them.
//!
//! # Architecture
//!
//! ```text
//! base64 → Decode → Encode (CLIP vision) → Category → Color/Pattern/Gender
//!                                                  → Sleeve/Neckline/Length (gated) → JSON
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use drape_core::{BatchRequest, Config, Drape, ImageItem};
//!
//! #[tokio::main]
//! async fn main() -> drape_core::Result<()> {
//!     let drape = Drape::load(Config::load()?)?;
//!
//!     let request = BatchRequest::new(vec![ImageItem::new(base64_jpeg, "sku-42")]);
//!     let response = drape.analyze_batch(&request).await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod attributes;
pub mod config;
pub mod embedding;
pub mod error;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

// Re-exports for convenient access
pub use attributes::{Attribute, AttributeVocabulary};
pub use config::{Config, FailurePolicy};
pub use embedding::{ClipEncoder, ImageTextEncoder};
pub use error::{ConfigError, DrapeError, PipelineError, PipelineResult, Result};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{BatchAnalyzer, DecodedImage, ImageDecoder};
pub use types::{
    AnalyzeRequest, AnalyzeResponse, AttributeSet, BatchOutcome, BatchRequest, BatchResponse,
    BatchStats, ClassificationResult, EmbedBatchRequest, EmbedBatchResponse, EmbedKind,
    EmbedRequest, EmbedResponse, ImageItem, ImageResult,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error for a single-image call without a payload.
pub const NO_IMAGE_DATA: &str = "No image data provided";

/// Drape service - the main entry point for attribute extraction.
///
/// Holds the encoder and pre-encoded prompt banks. Construct once per process
/// and share behind an `Arc`; every method takes `&self`.
pub struct Drape {
    config: Config,
    analyzer: BatchAnalyzer,
}

impl Drape {
    /// Load the ONNX CLIP model named in the config and encode all prompts.
    ///
    /// Blocks while the model loads; call from `spawn_blocking` in async code.
    pub fn load(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Drape v{}", VERSION);
        let encoder = ClipEncoder::load(&config)?;
        Self::with_encoder(config, Arc::new(encoder))
    }

    /// Build the service around any image-text encoder.
    pub fn with_encoder(config: Config, encoder: Arc<dyn ImageTextEncoder>) -> Result<Self> {
        let analyzer = BatchAnalyzer::new(&config, encoder)?;
        Ok(Self { config, analyzer })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyze a batch of images. Results are index-aligned with the request.
    pub async fn analyze_batch(&self, request: &BatchRequest) -> BatchResponse {
        self.analyzer.analyze(request.images()).await
    }

    /// Analyze one image.
    pub async fn analyze_image(&self, request: &AnalyzeRequest) -> AnalyzeResponse {
        let Some(data) = request.image.as_deref().filter(|d| !d.trim().is_empty()) else {
            return AnalyzeResponse::failure(NO_IMAGE_DATA);
        };

        let item = ImageItem {
            data: data.to_string(),
            id: None,
            mime_type: request.mime_type.clone(),
        };
        let response = self.analyzer.analyze(std::slice::from_ref(&item)).await;

        match response.results.into_iter().next() {
            Some(result) => result.into(),
            None => AnalyzeResponse::failure(
                response
                    .error
                    .unwrap_or_else(|| "Image was not processed".to_string()),
            ),
        }
    }

    /// Embed one text or image into the joint space.
    pub async fn embed(&self, request: &EmbedRequest) -> EmbedResponse {
        let embedded = match request.kind {
            EmbedKind::Text => match request.text.as_deref() {
                Some(text) => self.analyzer.embed_texts(vec![text.to_string()]).await,
                None => return EmbedResponse::failure("No text provided"),
            },
            EmbedKind::Image => match request.image.as_deref() {
                Some(image) => match self.analyzer.decoder().decode("image_0", image, None).await
                {
                    Ok(decoded) => self.analyzer.embed_images(vec![decoded]).await,
                    Err(e) => Err(e),
                },
                None => return EmbedResponse::failure(NO_IMAGE_DATA),
            },
        };

        match embedded.map(|mut v| v.pop()) {
            Ok(Some(embedding)) => EmbedResponse::success(embedding),
            Ok(None) => EmbedResponse::failure("Encoder returned no embedding"),
            Err(e) => EmbedResponse::failure(e.to_string()),
        }
    }

    /// Embed many images, encoded in chunks of `batch.chunk_size`.
    ///
    /// Any undecodable image fails the whole call so vectors stay aligned
    /// with the input.
    pub async fn embed_batch(&self, request: &EmbedBatchRequest) -> EmbedBatchResponse {
        let decoder = self.analyzer.decoder();
        let decoded = futures_util::future::join_all(
            request
                .images
                .iter()
                .enumerate()
                .map(|(i, payload)| async move { decoder.decode(&format!("image_{i}"), payload, None).await }),
        )
        .await;

        let images = match decoded.into_iter().collect::<std::result::Result<Vec<_>, _>>() {
            Ok(images) => images,
            Err(e) => return EmbedBatchResponse::failure(e.to_string()),
        };

        match self.analyzer.embed_images(images).await {
            Ok(embeddings) => EmbedBatchResponse::success(embeddings),
            Err(e) => EmbedBatchResponse::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_base64, FakeEncoder};

    fn drape() -> (Drape, Arc<FakeEncoder>) {
        let encoder = Arc::new(FakeEncoder::new());
        let drape = Drape::with_encoder(Config::default(), encoder.clone()).unwrap();
        (drape, encoder)
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_batch_wire_shape() {
        let (drape, _) = drape();
        let request: BatchRequest = serde_json::from_value(serde_json::json!({
            "input": {"images": [{"data": png_base64([230, 20, 20], 6, 6), "id": "sku-9"}]}
        }))
        .unwrap();

        let response = drape.analyze_batch(&request).await;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["results"][0]["id"], "sku-9");
        assert_eq!(json["results"][0]["attributes"]["category"], "dress");
        assert!(json["results"][0]["confidence"]["sleeveLength"].is_number());
        assert_eq!(json["stats"]["total"], 1);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_analyze_image_success() {
        let (drape, _) = drape();
        let response = drape
            .analyze_image(&AnalyzeRequest {
                image: Some(png_base64([20, 20, 230], 6, 6)),
                mime_type: Some("image/png".to_string()),
            })
            .await;

        assert!(response.success);
        let attributes = response.attributes.unwrap();
        assert_eq!(attributes.get(Attribute::Category), Some("shoes"));
        assert!(!attributes.contains(Attribute::Neckline));
    }

    #[tokio::test]
    async fn test_analyze_image_without_data() {
        let (drape, encoder) = drape();
        let calls = encoder.image_calls();

        let response = drape.analyze_image(&AnalyzeRequest::default()).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some(NO_IMAGE_DATA));
        assert_eq!(encoder.image_calls(), calls);
    }

    #[tokio::test]
    async fn test_analyze_image_decode_failure_reports_cause() {
        let (drape, _) = drape();
        let response = drape
            .analyze_image(&AnalyzeRequest {
                image: Some("bm90IGFuIGltYWdl".to_string()),
                mime_type: None,
            })
            .await;
        assert!(!response.success);
        assert!(response
            .error
            .unwrap()
            .starts_with("Failed to decode image: "));
    }

    #[tokio::test]
    async fn test_embed_text_and_image() {
        let (drape, _) = drape();

        let text = drape
            .embed(&EmbedRequest {
                kind: EmbedKind::Text,
                text: Some("red clothing".to_string()),
                image: None,
            })
            .await;
        assert!(text.success);
        assert_eq!(text.dimensions, FakeEncoder::DIM);
        assert_eq!(text.embedding, vec![1.0, 0.0, 0.0, 0.0]);

        let image = drape
            .embed(&EmbedRequest {
                kind: EmbedKind::Image,
                text: None,
                image: Some(png_base64([0, 200, 0], 3, 3)),
            })
            .await;
        assert!(image.success);
        assert!((image.embedding[1] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_missing_text() {
        let (drape, _) = drape();
        let response = drape
            .embed(&EmbedRequest {
                kind: EmbedKind::Text,
                text: None,
                image: None,
            })
            .await;
        assert!(!response.success);
        assert_eq!(response.dimensions, 0);
    }

    #[tokio::test]
    async fn test_embed_batch_chunks_and_aligns() {
        let encoder = Arc::new(FakeEncoder::new());
        let mut config = Config::default();
        config.batch.chunk_size = 2;
        let drape = Drape::with_encoder(config, encoder.clone()).unwrap();

        let request = EmbedBatchRequest {
            images: vec![
                png_base64([255, 0, 0], 2, 2),
                png_base64([0, 255, 0], 2, 2),
                png_base64([0, 0, 255], 2, 2),
            ],
        };
        let response = drape.embed_batch(&request).await;

        assert!(response.success);
        assert_eq!(response.count, 3);
        assert!((response.embeddings[2][2] - 1.0).abs() < 1e-6);
        assert_eq!(encoder.image_calls(), 2);
    }

    #[tokio::test]
    async fn test_embed_batch_fails_on_bad_image() {
        let (drape, _) = drape();
        let response = drape
            .embed_batch(&EmbedBatchRequest {
                images: vec![png_base64([1, 1, 1], 2, 2), "????".to_string()],
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("image_1"));
    }
}
