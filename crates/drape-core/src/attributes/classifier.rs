//! Zero-shot classification of images against candidate prompts.
//!
//! Embeddings on both sides are L2-normalized, so the matrix product of the
//! image rows with the prompt rows is the cosine similarity. Scaled cosines
//! are softmaxed over the prompt axis and the argmax label wins.

use std::sync::Arc;

use ndarray::Array2;

use crate::embedding::ImageTextEncoder;
use crate::error::PipelineError;
use crate::math::{argmax, softmax_in_place};
use crate::pipeline::DecodedImage;
use crate::types::ClassificationResult;

use super::prompt_bank::PromptBank;
use super::vocabulary::{Attribute, Prompt};

/// Scores images against prompts with a shared image-text encoder.
#[derive(Clone)]
pub struct ZeroShotClassifier {
    encoder: Arc<dyn ImageTextEncoder>,
}

impl ZeroShotClassifier {
    pub fn new(encoder: Arc<dyn ImageTextEncoder>) -> Self {
        Self { encoder }
    }

    /// Classify images against an ad-hoc prompt list.
    ///
    /// Encodes all images in one vision call and all prompts in one text call.
    /// Returns one result per image, in input order.
    pub fn classify(
        &self,
        images: &[DecodedImage],
        prompts: &[Prompt],
    ) -> Result<Vec<ClassificationResult>, PipelineError> {
        if images.is_empty() {
            return Ok(vec![]);
        }
        if prompts.is_empty() {
            return Err(PipelineError::Classification {
                message: "No candidate prompts".to_string(),
            });
        }

        let image_embeddings = self.encoder.encode_images(images)?;
        if image_embeddings.len() != images.len() {
            return Err(PipelineError::Classification {
                message: format!(
                    "Vision encoder returned {} embeddings for {} images",
                    image_embeddings.len(),
                    images.len()
                ),
            });
        }

        // The attribute tag is irrelevant for ad-hoc prompts.
        let bank = PromptBank::from_prompts(Attribute::Category, prompts, self.encoder.as_ref())?;
        classify_encoded(&image_embeddings, &bank, self.encoder.logit_scale())
    }
}

/// Score pre-computed image embeddings against a prompt bank.
pub fn classify_encoded(
    image_embeddings: &[Vec<f32>],
    bank: &PromptBank,
    logit_scale: f32,
) -> Result<Vec<ClassificationResult>, PipelineError> {
    let probabilities = probabilities(image_embeddings, bank, logit_scale)?;

    probabilities
        .rows()
        .into_iter()
        .map(|row| {
            let (index, confidence) =
                argmax(&row.to_vec()).ok_or_else(|| PipelineError::Classification {
                    message: format!("No scores for {}", bank.attribute()),
                })?;
            Ok(ClassificationResult::new(
                bank.labels()[index].clone(),
                confidence,
            ))
        })
        .collect()
}

/// Softmax probabilities, `images × labels`; every row sums to 1.
pub fn probabilities(
    image_embeddings: &[Vec<f32>],
    bank: &PromptBank,
    logit_scale: f32,
) -> Result<Array2<f32>, PipelineError> {
    let dim = bank.embedding_dim();
    if let Some(bad) = image_embeddings.iter().find(|e| e.len() != dim) {
        return Err(PipelineError::Classification {
            message: format!(
                "Image embedding has {} dims but {} prompts have {}",
                bad.len(),
                bank.attribute(),
                dim
            ),
        });
    }

    let flat: Vec<f32> = image_embeddings.iter().flatten().copied().collect();
    let images = Array2::from_shape_vec((image_embeddings.len(), dim), flat).map_err(|e| {
        PipelineError::Classification {
            message: format!("Failed to build image matrix: {e}"),
        }
    })?;

    let mut logits = images.dot(&bank.matrix().t()) * logit_scale;
    if let Some(row) = logits
        .rows()
        .into_iter()
        .position(|row| row.iter().any(|x| !x.is_finite()))
    {
        return Err(PipelineError::Classification {
            message: format!("Non-finite {} scores for image {row}", bank.attribute()),
        });
    }

    for mut row in logits.rows_mut() {
        let mut scores = row.to_vec();
        softmax_in_place(&mut scores);
        row.assign(&ndarray::ArrayView1::from(&scores));
    }

    Ok(logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::vocabulary;
    use crate::test_support::{decoded, FakeEncoder};

    fn color_bank() -> PromptBank {
        PromptBank::from_embeddings(
            Attribute::Color,
            vec!["red".to_string(), "green".to_string(), "blue".to_string()],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_classify_encoded_picks_nearest_prompt() {
        let embeddings = vec![
            vec![0.0, 0.0, 1.0],
            crate::math::l2_normalize(&[0.9, 0.1, 0.0]),
        ];
        let results = classify_encoded(&embeddings, &color_bank(), 100.0).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "blue");
        assert_eq!(results[1].label, "red");
        assert!(results[0].confidence > 0.99);
    }

    #[test]
    fn test_probabilities_rows_sum_to_one() {
        let embeddings = vec![
            crate::math::l2_normalize(&[0.3, 0.5, 0.2]),
            crate::math::l2_normalize(&[1.0, 1.0, 1.0]),
        ];
        let probs = probabilities(&embeddings, &color_bank(), 100.0).unwrap();

        for row in probs.rows() {
            let sum: f32 = row.sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_uniform_scores_tie_to_first_label_with_floor_confidence() {
        // Orthogonal to every prompt: all logits equal
        let results = classify_encoded(&[vec![0.0, 0.0, 0.0]], &color_bank(), 100.0).unwrap();
        assert_eq!(results[0].label, "red");
        assert!((results[0].confidence - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_classification_error() {
        let err = classify_encoded(&[vec![1.0, 0.0]], &color_bank(), 100.0).unwrap_err();
        assert!(matches!(err, PipelineError::Classification { .. }));
    }

    #[test]
    fn test_non_finite_scores_are_classification_errors() {
        let err = classify_encoded(&[vec![1.0, 0.0, 0.0]], &color_bank(), f32::INFINITY)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Classification { .. }));

        let embeddings = vec![vec![0.0, 0.0, 1.0], vec![f32::NAN, 0.0, 0.0]];
        let err = classify_encoded(&embeddings, &color_bank(), 100.0).unwrap_err();
        assert!(err.to_string().contains("image 1"));
    }

    #[test]
    fn test_classify_end_to_end_is_deterministic() {
        let encoder = Arc::new(FakeEncoder::new());
        let classifier = ZeroShotClassifier::new(encoder.clone());
        let images = vec![decoded([250, 5, 5]), decoded([5, 5, 250])];
        let prompts = vocabulary::CATEGORY.prompts();

        let first = classifier.classify(&images, &prompts).unwrap();
        let second = classifier.classify(&images, &prompts).unwrap();

        assert_eq!(first[0].label, "dress");
        assert_eq!(first[1].label, "shoes");
        assert_eq!(first, second);
        assert_eq!(encoder.image_calls(), 2);
        assert_eq!(encoder.text_calls(), 2);
    }

    #[test]
    fn test_classify_empty_images_skips_encoder() {
        let encoder = Arc::new(FakeEncoder::new());
        let classifier = ZeroShotClassifier::new(encoder.clone());
        let results = classifier
            .classify(&[], &vocabulary::COLOR.prompts())
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(encoder.image_calls(), 0);
        assert_eq!(encoder.text_calls(), 0);
    }
}
