//! CLIP image and text embedding.
//!
//! This module maps images and prompt strings into the joint image-text space
//! of a CLIP checkpoint running locally via ONNX Runtime. The rest of the crate
//! only sees the [`ImageTextEncoder`] trait, so the orchestrator can be driven
//! by any scorer with the same contract.
//!
//! # Usage
//!
//! ```rust,ignore
//! use drape_core::embedding::{ClipEncoder, ImageTextEncoder};
//! use drape_core::Config;
//!
//! let config = Config::default();
//! let encoder = ClipEncoder::load(&config)?;
//! let embeddings = encoder.encode_texts(&["a photo of a dress".to_string()])?;
//! // embeddings[0] is an L2-normalized Vec<f32> with 512 elements
//! ```

pub(crate) mod preprocess;
pub(crate) mod text;
pub(crate) mod vision;

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::DecodedImage;

pub use self::preprocess::preprocess;
use self::text::ClipTextEncoder;
use self::vision::ClipVisionSession;

/// The vision encoder ONNX model filename.
pub const VISUAL_MODEL_FILENAME: &str = "visual.onnx";

/// The text encoder ONNX model filename.
pub const TEXT_MODEL_FILENAME: &str = "text_model.onnx";

/// The tokenizer filename.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Every file a model directory must contain.
pub const MODEL_FILES: &[&str] = &[VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME];

/// A vision-language model that embeds images and text into one space.
///
/// Implementations return L2-normalized vectors, one per input, in input
/// order. Calls are blocking and may be made from several threads at once.
pub trait ImageTextEncoder: Send + Sync {
    /// Embed decoded images in one vectorized call.
    fn encode_images(&self, images: &[DecodedImage]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Embed text prompts in one vectorized call.
    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Temperature applied to cosine similarities before softmax.
    fn logit_scale(&self) -> f32;
}

/// ONNX CLIP encoder: vision session, text session and tokenizer.
pub struct ClipEncoder {
    vision: ClipVisionSession,
    text: ClipTextEncoder,
    image_size: u32,
    logit_scale: f32,
}

impl ClipEncoder {
    /// Load both CLIP towers from `{model_dir}/{model.name}/`.
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        let model_path = config.model_path();
        let visual_path = model_path.join(VISUAL_MODEL_FILENAME);

        if !visual_path.exists() {
            return Err(PipelineError::Model {
                message: format!(
                    "Vision encoder not found at {:?}. Run `drape models download` first.",
                    visual_path
                ),
            });
        }

        tracing::info!("Loading CLIP model from {:?}", model_path);
        let vision = ClipVisionSession::load(&visual_path)?;
        let text = ClipTextEncoder::new(&model_path, config.model.max_text_length)?;
        tracing::info!("CLIP model loaded successfully");

        Ok(Self {
            vision,
            text,
            image_size: config.model.image_size,
            logit_scale: config.model.logit_scale,
        })
    }

    /// Check whether every model file exists on disk.
    pub fn model_exists(model_path: &Path) -> bool {
        MODEL_FILES.iter().all(|f| model_path.join(f).exists())
    }

    /// Files missing from a model directory.
    pub fn missing_files(model_path: &Path) -> Vec<PathBuf> {
        MODEL_FILES
            .iter()
            .map(|f| model_path.join(f))
            .filter(|p| !p.exists())
            .collect()
    }
}

impl ImageTextEncoder for ClipEncoder {
    fn encode_images(&self, images: &[DecodedImage]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let tensors: Vec<_> = images
            .iter()
            .map(|d| preprocess(&d.image, self.image_size))
            .collect();
        self.vision.embed_batch(&tensors)
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.text.encode_batch(texts)
    }

    fn logit_scale(&self) -> f32 {
        self.logit_scale
    }
}
