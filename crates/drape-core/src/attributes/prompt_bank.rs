//! Pre-computed prompt embeddings for fast scoring.
//!
//! A prompt bank stores a `labels × dim` matrix of text embeddings for one
//! vocabulary, encoded once at startup and shared read-only by every batch.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::embedding::ImageTextEncoder;
use crate::error::PipelineError;

use super::vocabulary::{Attribute, AttributeVocabulary, Prompt};

/// Text embeddings for the prompts of one vocabulary.
#[derive(Debug, Clone)]
pub struct PromptBank {
    attribute: Attribute,
    labels: Vec<String>,
    /// One L2-normalized row per label, in label order.
    matrix: Array2<f32>,
}

impl PromptBank {
    /// Encode every prompt of a vocabulary in one text encoder call.
    pub fn encode(
        vocabulary: &AttributeVocabulary,
        encoder: &dyn ImageTextEncoder,
    ) -> Result<Self, PipelineError> {
        Self::from_prompts(vocabulary.attribute, &vocabulary.prompts(), encoder)
    }

    /// Encode an arbitrary prompt list for an attribute.
    pub fn from_prompts(
        attribute: Attribute,
        prompts: &[Prompt],
        encoder: &dyn ImageTextEncoder,
    ) -> Result<Self, PipelineError> {
        let texts: Vec<String> = prompts.iter().map(|p| p.text.clone()).collect();
        let embeddings = encoder.encode_texts(&texts)?;
        let labels = prompts.iter().map(|p| p.label.clone()).collect();
        Self::from_embeddings(attribute, labels, embeddings)
    }

    /// Build a bank from labels and their already-computed embeddings.
    pub fn from_embeddings(
        attribute: Attribute,
        labels: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, PipelineError> {
        if labels.is_empty() {
            return Err(PipelineError::Classification {
                message: format!("Empty vocabulary for {attribute}"),
            });
        }
        if embeddings.len() != labels.len() {
            return Err(PipelineError::Classification {
                message: format!(
                    "Text encoder returned {} embeddings for {} {} prompts",
                    embeddings.len(),
                    labels.len(),
                    attribute
                ),
            });
        }

        let dim = embeddings[0].len();
        if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
            return Err(PipelineError::Classification {
                message: format!("Inconsistent prompt embedding dimensions for {attribute}"),
            });
        }

        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((labels.len(), dim), flat).map_err(|e| {
            PipelineError::Classification {
                message: format!("Failed to build prompt matrix for {attribute}: {e}"),
            }
        })?;

        Ok(Self {
            attribute,
            labels,
            matrix,
        })
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// Labels in row order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Prompt embedding matrix, `labels × dim`.
    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Prompt banks for a set of vocabularies, keyed by attribute.
#[derive(Debug, Clone, Default)]
pub struct PromptBanks {
    banks: BTreeMap<Attribute, PromptBank>,
}

impl PromptBanks {
    /// Encode every vocabulary. Runs once per process at model load.
    pub fn encode_all(
        vocabularies: &[AttributeVocabulary],
        encoder: &dyn ImageTextEncoder,
    ) -> Result<Self, PipelineError> {
        let start = std::time::Instant::now();
        let mut banks = BTreeMap::new();

        for vocabulary in vocabularies {
            let bank = PromptBank::encode(vocabulary, encoder)?;
            tracing::debug!("  Encoded {} {} prompts", bank.len(), vocabulary.attribute);
            banks.insert(vocabulary.attribute, bank);
        }

        let prompt_count: usize = banks.values().map(PromptBank::len).sum();
        tracing::info!(
            "Prompt banks ready: {} vocabularies, {} prompts ({:?})",
            banks.len(),
            prompt_count,
            start.elapsed()
        );

        Ok(Self { banks })
    }

    /// Bank for an attribute.
    pub fn get(&self, attribute: Attribute) -> Result<&PromptBank, PipelineError> {
        self.banks
            .get(&attribute)
            .ok_or_else(|| PipelineError::Classification {
                message: format!("No prompt bank for {attribute}"),
            })
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::vocabulary;
    use crate::test_support::FakeEncoder;

    #[test]
    fn test_encode_keeps_label_order() {
        let encoder = FakeEncoder::new();
        let bank = PromptBank::encode(&vocabulary::GENDER, &encoder).unwrap();

        assert_eq!(bank.attribute(), Attribute::Gender);
        assert_eq!(bank.labels()[0], "men");
        assert_eq!(bank.labels()[5], "kids");
        assert_eq!(bank.matrix().dim(), (6, FakeEncoder::DIM));
    }

    #[test]
    fn test_from_embeddings_rejects_count_mismatch() {
        let err = PromptBank::from_embeddings(
            Attribute::Color,
            vec!["red".to_string(), "blue".to_string()],
            vec![vec![1.0, 0.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("1 embeddings for 2 color prompts"));
    }

    #[test]
    fn test_from_embeddings_rejects_ragged_rows() {
        let err = PromptBank::from_embeddings(
            Attribute::Color,
            vec!["red".to_string(), "blue".to_string()],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Classification { .. }));
    }

    #[test]
    fn test_encode_all_one_text_call_per_vocabulary() {
        let encoder = FakeEncoder::new();
        let banks = PromptBanks::encode_all(vocabulary::ALL, &encoder).unwrap();

        assert_eq!(banks.len(), 7);
        assert_eq!(encoder.text_calls(), 7);
        assert_eq!(banks.get(Attribute::Length).unwrap().len(), 5);
    }

    #[test]
    fn test_missing_bank_is_an_error() {
        let banks = PromptBanks::default();
        assert!(banks.get(Attribute::Category).is_err());
    }
}
