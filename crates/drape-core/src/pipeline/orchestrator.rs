//! Batch orchestration - wires together decode, encode and extraction.
//!
//! Every stage carries the original input index so results come back
//! index-aligned with the request, including items that failed to decode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::attributes::vocabulary::{self, AttributeVocabulary, CATEGORY};
use crate::attributes::{Attribute, AttributeExtractor, PromptBanks};
use crate::config::{Config, FailurePolicy};
use crate::embedding::ImageTextEncoder;
use crate::error::PipelineError;
use crate::types::{
    AttributeSet, BatchResponse, BatchStats, ClassificationResult, ImageItem, ImageResult,
    DECODE_FAILURE,
};

use super::decode::{DecodedImage, ImageDecoder};

/// Batch-level error when no item could be decoded.
pub const ALL_DECODE_FAILED: &str = "All images failed to decode";

/// A decoded item waiting for classification.
struct Pending {
    index: usize,
    id: String,
    image: DecodedImage,
}

/// Drives the extraction pipeline for one batch call at a time.
///
/// Holds only shared read-only state, so one analyzer serves concurrent calls.
pub struct BatchAnalyzer {
    encoder: Arc<dyn ImageTextEncoder>,
    banks: Arc<PromptBanks>,
    decoder: ImageDecoder,
    independent: Vec<AttributeVocabulary>,
    chunk_size: usize,
    encode_timeout_ms: u64,
    failure_policy: FailurePolicy,
}

impl BatchAnalyzer {
    /// Build an analyzer, encoding every prompt bank up front.
    pub fn new(config: &Config, encoder: Arc<dyn ImageTextEncoder>) -> Result<Self, PipelineError> {
        let banks = PromptBanks::encode_all(vocabulary::ALL, encoder.as_ref())?;
        Ok(Self::with_banks(config, encoder, Arc::new(banks)))
    }

    /// Build an analyzer around already-encoded prompt banks.
    pub fn with_banks(
        config: &Config,
        encoder: Arc<dyn ImageTextEncoder>,
        banks: Arc<PromptBanks>,
    ) -> Self {
        let independent = vocabulary::INDEPENDENT
            .iter()
            .filter(|v| v.attribute != Attribute::Gender || config.attributes.gender)
            .copied()
            .collect();

        Self {
            encoder,
            banks,
            decoder: ImageDecoder::new(config.limits.clone()),
            independent,
            chunk_size: config.batch.chunk_size.max(1),
            encode_timeout_ms: config.limits.encode_timeout_ms,
            failure_policy: config.classification.failure_policy,
        }
    }

    /// The decoder used for incoming payloads.
    pub fn decoder(&self) -> &ImageDecoder {
        &self.decoder
    }

    /// Analyze a batch. Always returns a response; failures are reported in it.
    pub async fn analyze(&self, items: &[ImageItem]) -> BatchResponse {
        // Intake
        if items.is_empty() {
            tracing::debug!("Rejecting empty batch");
            return BatchResponse::rejected(PipelineError::EmptyBatch.to_string());
        }

        let start = Instant::now();
        let total = items.len();
        let ids: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(i, item)| item.resolved_id(i))
            .collect();
        let mut slots: Vec<Option<ImageResult>> = vec![None; total];

        // Decode
        let decode_start = Instant::now();
        let decoded = join_all(items.iter().zip(&ids).enumerate().map(
            |(index, (item, id))| async move {
                let result = self
                    .decoder
                    .decode(id, &item.data, item.mime_type.as_deref())
                    .await;
                (index, result)
            },
        ))
        .await;

        let mut pending = Vec::with_capacity(total);
        for (index, result) in decoded {
            match result {
                Ok(image) => pending.push(Pending {
                    index,
                    id: ids[index].clone(),
                    image,
                }),
                Err(e) => {
                    tracing::trace!("{} failed to decode: {}", ids[index], e);
                    slots[index] = Some(ImageResult::failure(
                        &ids[index],
                        DECODE_FAILURE,
                        Some(e.to_string()),
                    ));
                }
            }
        }
        tracing::debug!(
            "  Decode: {}/{} images in {:?}",
            pending.len(),
            total,
            decode_start.elapsed()
        );

        if pending.is_empty() {
            let results = recombine(slots, &ids);
            let stats = BatchStats::from_results(&results, start.elapsed().as_secs_f64());
            tracing::warn!("All {} images failed to decode", total);
            return BatchResponse {
                error: Some(ALL_DECODE_FAILED.to_string()),
                results,
                stats: Some(stats),
            };
        }

        // Encode and extract, one chunk at a time
        let mut remaining = pending.into_iter();
        loop {
            let chunk: Vec<Pending> = remaining.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }

            let (meta, images): (Vec<(usize, String)>, Vec<DecodedImage>) = chunk
                .into_iter()
                .map(|p| ((p.index, p.id), p.image))
                .unzip();

            let outcome = match self.encode_chunk(images).await {
                Ok(embeddings) => self.extract(&embeddings),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(sets) => {
                    for ((index, id), set) in meta.into_iter().zip(sets) {
                        slots[index] = Some(ImageResult::success(id, set));
                    }
                }
                Err(e) => match self.failure_policy {
                    FailurePolicy::Degrade => {
                        tracing::warn!(
                            "Classification failed for {} images, substituting placeholders: {}",
                            meta.len(),
                            e
                        );
                        for (index, id) in meta {
                            slots[index] =
                                Some(ImageResult::success(id, self.degraded_set()).degraded());
                        }
                    }
                    FailurePolicy::FailFast => {
                        tracing::warn!("Classification failed, failing batch: {}", e);
                        return fail_batch(&ids, &e, start);
                    }
                },
            }
        }

        // Recombine and report
        let results = recombine(slots, &ids);
        let stats = BatchStats::from_results(&results, start.elapsed().as_secs_f64());
        tracing::info!(
            "Batch done: {}/{} succeeded{} in {:.2}s ({:.1} img/s)",
            stats.successful,
            stats.total,
            if stats.degraded > 0 {
                format!(" ({} degraded)", stats.degraded)
            } else {
                String::new()
            },
            stats.processing_time,
            stats.images_per_second
        );

        BatchResponse {
            error: None,
            results,
            stats: Some(stats),
        }
    }

    /// Embed decoded images in chunks on the blocking pool.
    pub async fn embed_images(
        &self,
        images: Vec<DecodedImage>,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut embeddings = Vec::with_capacity(images.len());
        let mut remaining = images.into_iter();
        loop {
            let chunk: Vec<DecodedImage> = remaining.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            embeddings.extend(self.encode_chunk(chunk).await?);
        }
        Ok(embeddings)
    }

    /// Embed text prompts on the blocking pool.
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PipelineError> {
        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode_texts(&texts))
            .await
            .map_err(|e| PipelineError::Model {
                message: format!("Text encoder task failed: {e}"),
            })?
    }

    /// Run the vision encoder on one chunk under the encode timeout.
    async fn encode_chunk(
        &self,
        images: Vec<DecodedImage>,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let count = images.len();
        let encoder = Arc::clone(&self.encoder);
        let encode_start = Instant::now();

        let encode_result = timeout(Duration::from_millis(self.encode_timeout_ms), async move {
            tokio::task::spawn_blocking(move || encoder.encode_images(&images)).await
        })
        .await;

        let embeddings = match encode_result {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Classification {
                    message: format!("Encoder task failed: {e}"),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    id: format!("chunk of {count}"),
                    stage: "encode".to_string(),
                    timeout_ms: self.encode_timeout_ms,
                })
            }
        };

        if embeddings.len() != count {
            return Err(PipelineError::Classification {
                message: format!(
                    "Vision encoder returned {} embeddings for {} images",
                    embeddings.len(),
                    count
                ),
            });
        }

        tracing::debug!("  Encode: {} images in {:?}", count, encode_start.elapsed());
        Ok(embeddings)
    }

    /// Category, then the independent attributes, then the gated ones.
    fn extract(&self, embeddings: &[Vec<f32>]) -> Result<Vec<AttributeSet>, PipelineError> {
        let scale = self.encoder.logit_scale();
        let mut sets = vec![AttributeSet::default(); embeddings.len()];

        let categories = self.extractor(&CATEGORY, scale)?.extract(embeddings)?;
        for (set, result) in sets.iter_mut().zip(&categories) {
            set.insert(Attribute::Category, result.clone());
        }

        for vocab in &self.independent {
            let results = self.extractor(vocab, scale)?.extract(embeddings)?;
            for (set, result) in sets.iter_mut().zip(results) {
                set.insert(vocab.attribute, result);
            }
        }

        let labels: Vec<&str> = categories.iter().map(|r| r.label.as_str()).collect();
        for vocab in vocabulary::CONDITIONAL {
            let results = self
                .extractor(vocab, scale)?
                .extract_gated(embeddings, &labels)?;
            for (set, result) in sets.iter_mut().zip(results) {
                if let Some(result) = result {
                    set.insert(vocab.attribute, result);
                }
            }
        }

        Ok(sets)
    }

    fn extractor<'a>(
        &'a self,
        vocabulary: &'a AttributeVocabulary,
        scale: f32,
    ) -> Result<AttributeExtractor<'a>, PipelineError> {
        let bank = self.banks.get(vocabulary.attribute)?;
        Ok(AttributeExtractor::new(vocabulary, bank, scale))
    }

    /// Placeholders for every unconditional attribute.
    fn degraded_set(&self) -> AttributeSet {
        let mut set = AttributeSet::default();
        set.insert(Attribute::Category, ClassificationResult::unknown());
        for vocab in &self.independent {
            set.insert(vocab.attribute, ClassificationResult::unknown());
        }
        set
    }
}

/// Fill any unset slot and unwrap the recombined results.
fn recombine(slots: Vec<Option<ImageResult>>, ids: &[String]) -> Vec<ImageResult> {
    slots
        .into_iter()
        .zip(ids)
        .map(|(slot, id)| {
            slot.unwrap_or_else(|| {
                ImageResult::failure(id, "Image was not processed", None)
            })
        })
        .collect()
}

/// Every item fails with the classification error.
fn fail_batch(ids: &[String], error: &PipelineError, start: Instant) -> BatchResponse {
    let message = error.to_string();
    let results: Vec<ImageResult> = ids
        .iter()
        .map(|id| ImageResult::failure(id, message.clone(), None))
        .collect();
    let stats = BatchStats::from_results(&results, start.elapsed().as_secs_f64());
    BatchResponse {
        error: Some(message),
        results,
        stats: Some(stats),
    }
}
