//! CLIP vision encoder session management and inference.
//!
//! Loads a CLIP vision tower exported to ONNX (with its projection head) and
//! runs batched inference to produce image embeddings in the joint
//! image-text space.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// Output tensor names that carry projected embeddings, in preference order.
///
/// `image_embeds` is the projected CLIP output; `pooler_output` is what
/// single-output exports name the same tensor. `last_hidden_state` is not
/// aligned with the text tower and must never be used.
const EMBEDDING_OUTPUTS: &[&str] = &["image_embeds", "pooler_output"];

/// Wraps an ONNX Runtime session for CLIP image embedding.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct ClipVisionSession {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl ClipVisionSession {
    /// Load a CLIP vision encoder from an ONNX file.
    pub fn load(model_path: &Path) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load vision model {:?}: {e}", model_path),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded CLIP vision model from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    /// Run batch inference on preprocessed image tensors.
    ///
    /// Each tensor must have shape \[1, 3, S, S\]. They are stacked into a
    /// single \[N, 3, S, S\] tensor for one ONNX call. Returns N L2-normalized
    /// embeddings in input order.
    pub fn embed_batch(&self, tensors: &[Array4<f32>]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batch_size = tensors.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let (batch_shape, flat_data) = stack_batch(tensors)?;

        let input_value = Value::from_array((batch_shape, flat_data)).map_err(|e| {
            PipelineError::Classification {
                message: format!("Failed to create batch input tensor: {e}"),
            }
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Classification {
                message: format!("Vision session lock poisoned: {e}"),
            })?;

        let outputs = session
            .run(inputs)
            .map_err(|e| PipelineError::Classification {
                message: format!("Vision encoder inference failed: {e}"),
            })?;

        let embeds = EMBEDDING_OUTPUTS
            .iter()
            .find_map(|wanted| outputs.iter().find(|(name, _)| **name == **wanted))
            .ok_or_else(|| PipelineError::Classification {
                message: format!("Vision model produced none of {:?}", EMBEDDING_OUTPUTS),
            })?;

        let (shape, data) =
            embeds
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Classification {
                    message: format!("Failed to extract image embeddings: {e}"),
                })?;

        let embedding_dim = match shape.len() {
            1 => data.len() / batch_size,
            2 => shape[1] as usize,
            _ => {
                return Err(PipelineError::Classification {
                    message: format!("Unexpected image embedding shape: {:?}", shape),
                });
            }
        };

        if embedding_dim == 0 {
            return Err(PipelineError::Classification {
                message: "Vision model returned empty embeddings".to_string(),
            });
        }

        // Split into per-image embeddings and L2-normalize each.
        let embeddings: Vec<Vec<f32>> = data
            .chunks(embedding_dim)
            .take(batch_size)
            .map(crate::math::l2_normalize)
            .collect();

        if embeddings.len() != batch_size {
            return Err(PipelineError::Classification {
                message: format!(
                    "Vision model returned {} embeddings for {} images",
                    embeddings.len(),
                    batch_size
                ),
            });
        }

        Ok(embeddings)
    }
}

/// Stack \[1, 3, S, S\] tensors into one image-major \[N, 3, S, S\] buffer.
fn stack_batch(tensors: &[Array4<f32>]) -> Result<(Vec<i64>, Vec<f32>), PipelineError> {
    let Some(first) = tensors.first() else {
        return Ok((vec![0, 0, 0, 0], vec![]));
    };
    let shape_0 = first.shape().to_vec();
    if let Some(bad) = tensors.iter().find(|t| t.shape() != shape_0.as_slice()) {
        return Err(PipelineError::Classification {
            message: format!(
                "Tensor shape mismatch in batch: expected {:?}, got {:?}",
                shape_0,
                bad.shape()
            ),
        });
    }

    let mut flat_data = Vec::with_capacity(tensors.len() * first.len());
    for t in tensors {
        flat_data.extend(t.iter().copied());
    }
    let batch_shape = vec![
        tensors.len() as i64,
        shape_0[1] as i64,
        shape_0[2] as i64,
        shape_0[3] as i64,
    ];
    Ok((batch_shape, flat_data))
}
