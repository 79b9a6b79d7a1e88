//! CLIP text encoder for generating prompt embeddings.
//!
//! Loads the CLIP text ONNX model and tokenizer, and encodes prompt strings
//! to vectors aligned with the vision encoder's space.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// Output tensor names that carry projected text embeddings, in preference order.
const EMBEDDING_OUTPUTS: &[&str] = &["text_embeds", "pooler_output"];

/// CLIP pads with its end-of-text token.
const PAD_TOKEN: &str = "<|endoftext|>";
const FALLBACK_PAD_ID: u32 = 49407;

/// CLIP text encoder wrapper.
///
/// Uses the same `Mutex<Session>` pattern as the vision encoder.
pub struct ClipTextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    max_length: usize,
    pad_id: u32,
    /// Whether the exported graph takes an `attention_mask` input.
    uses_attention_mask: bool,
}

impl ClipTextEncoder {
    /// Load the text encoder from the model directory.
    ///
    /// Expects `text_model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn new(model_dir: &Path, max_length: usize) -> Result<Self, PipelineError> {
        let text_model_path = model_dir.join(super::TEXT_MODEL_FILENAME);
        let tokenizer_path = model_dir.join(super::TOKENIZER_FILENAME);

        if !text_model_path.exists() {
            return Err(PipelineError::Model {
                message: format!(
                    "Text encoder not found at {:?}. Run `drape models download` first.",
                    text_model_path
                ),
            });
        }

        if !tokenizer_path.exists() {
            return Err(PipelineError::Model {
                message: format!(
                    "Tokenizer not found at {:?}. Run `drape models download` first.",
                    tokenizer_path
                ),
            });
        }

        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(&text_model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load text encoder model: {e}"),
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::Model {
                message: format!("Failed to load tokenizer: {e}"),
            }
        })?;

        let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(FALLBACK_PAD_ID);
        let uses_attention_mask = session
            .inputs()
            .iter()
            .any(|i| i.name() == "attention_mask");

        tracing::debug!(
            "Loaded CLIP text encoder (inputs: {:?}, outputs: {:?})",
            session
                .inputs()
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>(),
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length,
            pad_id,
            uses_attention_mask,
        })
    }

    /// Encode a batch of text strings to normalized embeddings.
    ///
    /// Returns one vector per input text, in order.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batch_size = texts.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;

        let (input_ids, attention_mask) =
            pack_token_ids(encodings.iter().map(|e| e.get_ids()), self.max_length, self.pad_id);
        let shape = vec![batch_size as i64, self.max_length as i64];

        let input_ids_value = Value::from_array((shape.clone(), input_ids)).map_err(|e| {
            PipelineError::Model {
                message: format!("Failed to create input tensor: {e}"),
            }
        })?;

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Text encoder lock poisoned: {e}"),
        })?;

        let outputs = if self.uses_attention_mask {
            let mask_value =
                Value::from_array((shape, attention_mask)).map_err(|e| PipelineError::Model {
                    message: format!("Failed to create attention mask tensor: {e}"),
                })?;
            session.run(ort::inputs![
                "input_ids" => input_ids_value,
                "attention_mask" => mask_value
            ])
        } else {
            session.run(ort::inputs!["input_ids" => input_ids_value])
        }
        .map_err(|e| PipelineError::Model {
            message: format!("Text encoder inference failed: {e}"),
        })?;

        let embeds = EMBEDDING_OUTPUTS
            .iter()
            .find_map(|wanted| outputs.iter().find(|(name, _)| **name == **wanted))
            .ok_or_else(|| PipelineError::Model {
                message: format!("Text encoder produced none of {:?}", EMBEDDING_OUTPUTS),
            })?;

        let (_shape, data) =
            embeds
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Model {
                    message: format!("Failed to extract text embeddings: {e}"),
                })?;

        let embedding_dim = data.len() / batch_size;
        if embedding_dim == 0 {
            return Err(PipelineError::Model {
                message: "Text encoder returned empty embeddings".to_string(),
            });
        }

        // Split flat output into per-text embeddings and L2-normalize
        let embeddings: Vec<Vec<f32>> = data
            .chunks(embedding_dim)
            .map(crate::math::l2_normalize)
            .collect();

        Ok(embeddings)
    }
}

/// Truncate/pad token ids into a `[batch, max_length]` row-major buffer plus its mask.
fn pack_token_ids<'a>(
    rows: impl Iterator<Item = &'a [u32]>,
    max_length: usize,
    pad_id: u32,
) -> (Vec<i64>, Vec<i64>) {
    let mut input_ids = Vec::new();
    let mut attention_mask = Vec::new();

    for ids in rows {
        let kept = ids.len().min(max_length);
        input_ids.extend(ids[..kept].iter().map(|&id| id as i64));
        input_ids.extend(std::iter::repeat(pad_id as i64).take(max_length - kept));
        attention_mask.extend(std::iter::repeat(1i64).take(kept));
        attention_mask.extend(std::iter::repeat(0i64).take(max_length - kept));
    }

    (input_ids, attention_mask)
}
