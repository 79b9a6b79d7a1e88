//! Zero-shot fashion attribute extraction.
//!
//! Scores image embeddings against fixed attribute vocabularies by comparing
//! them with pre-computed prompt embeddings.

pub mod classifier;
pub mod extractor;
pub mod prompt_bank;
pub mod vocabulary;

pub use classifier::{classify_encoded, ZeroShotClassifier};
pub use extractor::AttributeExtractor;
pub use prompt_bank::{PromptBank, PromptBanks};
pub use vocabulary::{Attribute, AttributeVocabulary, Gate, Prompt};
