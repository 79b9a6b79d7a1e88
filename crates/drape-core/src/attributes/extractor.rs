//! Attribute extractors: one vocabulary bound to the classifier.
//!
//! Unconditional extractors score every image. Conditional extractors score
//! only the images whose category passes the vocabulary's gate and leave the
//! rest empty.

use crate::error::PipelineError;
use crate::types::ClassificationResult;

use super::classifier::classify_encoded;
use super::prompt_bank::PromptBank;
use super::vocabulary::{Attribute, AttributeVocabulary, Gate};

/// Extracts one attribute from pre-computed image embeddings.
pub struct AttributeExtractor<'a> {
    vocabulary: &'a AttributeVocabulary,
    bank: &'a PromptBank,
    logit_scale: f32,
}

impl<'a> AttributeExtractor<'a> {
    pub fn new(vocabulary: &'a AttributeVocabulary, bank: &'a PromptBank, logit_scale: f32) -> Self {
        Self {
            vocabulary,
            bank,
            logit_scale,
        }
    }

    pub fn attribute(&self) -> Attribute {
        self.vocabulary.attribute
    }

    /// Classify every image. One result per embedding, same order.
    pub fn extract(
        &self,
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<ClassificationResult>, PipelineError> {
        if embeddings.is_empty() {
            return Ok(vec![]);
        }
        classify_encoded(embeddings, self.bank, self.logit_scale)
    }

    /// Classify only images whose category passes the gate.
    ///
    /// `categories[i]` is the category predicted for `embeddings[i]`. Images
    /// outside the gate get `None`; if none pass, nothing is scored.
    pub fn extract_gated(
        &self,
        embeddings: &[Vec<f32>],
        categories: &[&str],
    ) -> Result<Vec<Option<ClassificationResult>>, PipelineError> {
        if embeddings.len() != categories.len() {
            return Err(PipelineError::Classification {
                message: format!(
                    "{} embeddings but {} categories for {}",
                    embeddings.len(),
                    categories.len(),
                    self.attribute()
                ),
            });
        }

        if matches!(self.vocabulary.gate, Gate::Always) {
            return Ok(self.extract(embeddings)?.into_iter().map(Some).collect());
        }

        let subset: Vec<usize> = categories
            .iter()
            .enumerate()
            .filter(|(_, category)| self.vocabulary.gate.admits(category))
            .map(|(i, _)| i)
            .collect();

        let mut scattered = vec![None; embeddings.len()];
        if subset.is_empty() {
            return Ok(scattered);
        }

        let gathered: Vec<Vec<f32>> = subset.iter().map(|&i| embeddings[i].clone()).collect();
        let results = classify_encoded(&gathered, self.bank, self.logit_scale)?;

        tracing::trace!(
            "{}: scored {}/{} images",
            self.attribute(),
            subset.len(),
            embeddings.len()
        );

        for (index, result) in subset.into_iter().zip(results) {
            scattered[index] = Some(result);
        }
        Ok(scattered)
    }
}
