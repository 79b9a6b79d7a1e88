//! Core data types for the Drape attribute extraction service.
//!
//! Request and response shapes mirror the JSON contract of the batch,
//! single-image and embedding calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attributes::Attribute;

/// Error string reported for items whose payload could not be decoded.
pub const DECODE_FAILURE: &str = "Failed to decode image";

/// Placeholder label used when classification degrades.
pub const UNKNOWN_LABEL: &str = "unknown";

/// One image in a batch request. Immutable once received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageItem {
    /// Base64-encoded image bytes
    #[serde(default)]
    pub data: String,

    /// Caller-supplied identifier; defaults to `image_{index}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Declared MIME type (informational only)
    #[serde(
        default,
        rename = "mimeType",
        alias = "mime_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
}

impl ImageItem {
    /// Create an item from a payload with an explicit id.
    pub fn new(data: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            id: Some(id.into()),
            mime_type: None,
        }
    }

    /// Identifier of the item at `index`, generating a positional one if absent.
    pub fn resolved_id(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("image_{index}"))
    }
}

/// Winning label of one classification and its softmax probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// A member of the vocabulary that was scored
    pub label: String,

    /// Softmax maximum over that vocabulary, in [0, 1]
    pub confidence: f32,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Placeholder substituted when a classification call fails under the degrade policy.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LABEL, 0.0)
    }
}

/// Sparse per-image attributes with a parallel confidence map.
///
/// Conditional attributes are absent (not null) when the category does not
/// admit them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    pub attributes: BTreeMap<Attribute, String>,
    pub confidence: BTreeMap<Attribute, f32>,
}

impl AttributeSet {
    /// Record a classification for an attribute.
    pub fn insert(&mut self, attribute: Attribute, result: ClassificationResult) {
        self.confidence.insert(attribute, result.confidence);
        self.attributes.insert(attribute, result.label);
    }

    /// Label extracted for an attribute, if present.
    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        self.attributes.get(&attribute).map(String::as_str)
    }

    /// Confidence of an attribute, if present.
    pub fn confidence(&self, attribute: Attribute) -> Option<f32> {
        self.confidence.get(&attribute).copied()
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.attributes.contains_key(&attribute)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Outcome for one input item, at the same position as its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub id: String,

    pub success: bool,

    /// Present on success
    #[serde(flatten)]
    pub attributes: Option<AttributeSet>,

    /// Present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Underlying cause of a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Set when placeholder values replaced a failed classification
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl ImageResult {
    pub fn success(id: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            id: id.into(),
            success: true,
            attributes: Some(attributes),
            error: None,
            reason: None,
            degraded: false,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            attributes: None,
            error: Some(error.into()),
            reason,
            degraded: false,
        }
    }

    /// Mark the result as carrying placeholder classifications.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

/// Aggregate counters for a batch call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,

    /// Wall time in seconds
    pub processing_time: f64,

    /// Successful images per second of wall time
    pub images_per_second: f64,

    /// Successful results that carry placeholder classifications
    #[serde(default, skip_serializing_if = "is_zero")]
    pub degraded: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl BatchStats {
    /// Compute stats from the recombined results and elapsed wall time.
    pub fn from_results(results: &[ImageResult], elapsed_secs: f64) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let degraded = results.iter().filter(|r| r.success && r.degraded).count();
        let images_per_second = if elapsed_secs > 0.0 {
            successful as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            processing_time: elapsed_secs,
            images_per_second,
            degraded,
        }
    }
}

/// Terminal state of a batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSuccess,
    PartialSuccess,
    AllFailed,
}

/// Batch call envelope: `{"input": {"images": [...]}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub input: BatchInput,
}

/// Body of a batch call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInput {
    #[serde(default)]
    pub images: Vec<ImageItem>,
}

impl BatchRequest {
    pub fn new(images: Vec<ImageItem>) -> Self {
        Self {
            input: BatchInput { images },
        }
    }

    pub fn images(&self) -> &[ImageItem] {
        &self.input.images
    }
}

/// Batch call response. `results` is index-aligned with the request images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub results: Vec<ImageResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BatchStats>,
}

impl BatchResponse {
    /// Response for a request rejected before any processing.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            results: vec![],
            stats: None,
        }
    }

    /// Terminal state, or `None` for a rejected request.
    pub fn outcome(&self) -> Option<BatchOutcome> {
        let stats = self.stats.as_ref()?;
        Some(if stats.successful == 0 {
            BatchOutcome::AllFailed
        } else if stats.failed == 0 {
            BatchOutcome::AllSuccess
        } else {
            BatchOutcome::PartialSuccess
        })
    }
}

/// Single-image call: `{"image": "<base64>", "mimeType": "image/jpeg"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
}

/// Single-image response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,

    #[serde(flatten)]
    pub attributes: Option<AttributeSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl AnalyzeResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            attributes: None,
            error: Some(error.into()),
            degraded: false,
        }
    }
}

impl From<ImageResult> for AnalyzeResponse {
    fn from(result: ImageResult) -> Self {
        let error = match (result.error, result.reason) {
            (Some(error), Some(reason)) => Some(format!("{error}: {reason}")),
            (error, _) => error,
        };
        Self {
            success: result.success,
            attributes: result.attributes,
            error,
            degraded: result.degraded,
        }
    }
}

/// What an embedding call encodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Text,
    #[default]
    Image,
}

/// Embedding call: `{"type": "text", "text": "..."}` or `{"type": "image", "image": "<base64>"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedRequest {
    #[serde(default, rename = "type")]
    pub kind: EmbedKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Embedding response with an L2-normalized vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,

    pub dimensions: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbedResponse {
    pub fn success(embedding: Vec<f32>) -> Self {
        Self {
            success: true,
            dimensions: embedding.len(),
            embedding,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            embedding: vec![],
            dimensions: 0,
            error: Some(error.into()),
        }
    }
}

/// Batch embedding call: `{"images": ["<base64>", ...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedBatchRequest {
    #[serde(default)]
    pub images: Vec<String>,
}

/// Batch embedding response, one vector per input image in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedBatchResponse {
    pub success: bool,

    pub embeddings: Vec<Vec<f32>>,

    pub count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbedBatchResponse {
    pub fn success(embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            success: true,
            count: embeddings.len(),
            embeddings,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            embeddings: vec![],
            count: 0,
            error: Some(error.into()),
        }
    }
}
